// Generated from tally.bst. Do not edit.
#![allow(unused_mut, unused_variables, unused_assignments, unused_imports, dead_code)]

use bst_rs::bst::token::LocalKind;
use bst_rs::runtime::{ArgKind, Machine, Primitive, RunError, Value};

pub fn declare(m: &mut Machine) {
    m.declare_global("count", Value::Integer(0));
    m.declare_entry_var("sort.key$", LocalKind::String);
}

fn f_presort(m: &mut Machine) -> Result<(), RunError> {
    m.call("presort", move |m: &mut Machine| {
        let e0 = m.cite();
        m.set_entry_var("sort.key$", e0);
        Ok(())
    })
}

fn f_tally(m: &mut Machine) -> Result<(), RunError> {
    m.call("tally", move |m: &mut Machine| {
        let e0 = m.global("count");
        let e1 = m.prim(Primitive::Plus, vec![e0, Value::Integer(1)]);
        m.set_global("count", e1);
        Ok(())
    })
}

fn f_emphasize(m: &mut Machine, p0: Value) -> Result<Value, RunError> {
    m.call("emphasize", move |m: &mut Machine| {
        let e0 = m.coerce(ArgKind::String, p0.clone(), "*");
        let e1 = m.prim(Primitive::Concat, vec![Value::string("<i>"), e0]);
        let e2 = m.prim(Primitive::Concat, vec![e1, Value::string("</i>")]);
        Ok(e2)
    })
}

fn f_book(m: &mut Machine) -> Result<(), RunError> {
    m.call("book", move |m: &mut Machine| {
        let mut t1 = Value::Integer(0);
        let e0 = m.cite();
        m.write(e0);
        m.write(Value::string(": "));
        let e1 = m.field("title");
        t1 = f_emphasize(m, e1)?;
        m.write(t1.clone());
        m.newline();
        Ok(())
    })
}

fn f_default_type(m: &mut Machine) -> Result<(), RunError> {
    m.call("default.type", move |m: &mut Machine| {
        let e0 = m.field("title");
        let e1 = m.prim(Primitive::Empty, vec![e0]);
        if e1.is_true() {
            let e2 = m.cite();
            let e3 = m.prim(Primitive::Concat, vec![Value::string("empty title in "), e2]);
            m.warning(e3);
        } else {
            let e4 = m.field("title");
            m.write(e4);
            m.newline();
        }
        Ok(())
    })
}

fn f_stars(m: &mut Machine) -> Result<(), RunError> {
    m.call("stars", move |m: &mut Machine| {
        let mut t1 = Value::Integer(0);
        let e0 = m.global("count");
        t1 = e0;
        let mut g0 = 0;
        loop {
            let e1 = m.prim(Primitive::Greater, vec![t1.clone(), Value::Integer(0)]);
            if !e1.is_true() {
                break;
            }
            m.loop_guard(&mut g0)?;
            m.write(Value::string("*"));
            let e2 = m.prim(Primitive::Minus, vec![t1.clone(), Value::Integer(1)]);
            t1 = e2;
        }
        m.newline();
        Ok(())
    })
}

fn f_call_type_(m: &mut Machine) -> Result<(), RunError> {
    m.call("call.type$", move |m: &mut Machine| {
        if let Some(entry_type) = m.dispatch_type() {
            match &*entry_type {
                "book" => f_book(m)?,
                "default.type" => f_default_type(m)?,
                "presort" => f_presort(m)?,
                "tally" => f_tally(m)?,
                "stars" => f_stars(m)?,
                _ => f_default_type(m)?,
            }
        }
        Ok(())
    })
}

pub fn run(m: &mut Machine) -> Result<(), RunError> {
    m.iterate(|m| f_presort(m))?;
    m.sort();
    m.iterate(|m| f_tally(m))?;
    m.iterate(|m| f_call_type_(m))?;
    m.execute(|m| f_stars(m))?;
    Ok(())
}
