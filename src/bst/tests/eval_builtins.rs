/// eval_builtins.rs
///
/// Tests for the built-in functions. Every style runs in both modes and the
/// runs must agree.

use super::*;

#[test]
fn test_integer_builtins() {
    Tester::new_single_source_expect_ok("arithmetic", "
    FUNCTION { main } {
        #3 #4 + int.to.str$ write$ \" \" write$
        #20 #7 - int.to.str$ write$ \" \" write$
        #5 #2 > int.to.str$ write$
        #5 #2 < int.to.str$ write$
        #2 #2 = int.to.str$ write$
        \"a\" \"b\" = int.to.str$ write$
        newline$
    }
    EXECUTE { main }
    ").assert_modes_agree()
        .assert_output("7 13 1010\n")
        .assert_errors(0)
        .assert_tally("");
}

#[test]
fn test_string_builtins() {
    Tester::new_single_source_expect_ok("strings", r#"
    FUNCTION { main } {
        "Hello" " " * "World" * write$ newline$
        "The {TeX}book: A Guide" "t" change.case$ write$ newline$
        "abc" "u" change.case$ write$ newline$
        "Knuth" add.period$ write$ "Done!" add.period$ write$ newline$
        "Hello" #2 #3 substring$ write$ newline$
        "Hello" #-1 #3 substring$ write$ newline$
        "{\'e}t{\'e}" text.length$ int.to.str$ write$ newline$
        "Hello" #2 text.prefix$ write$ newline$
        "a-b~c {\ae}" purify$ write$ newline$
        "A" chr.to.int$ int.to.str$ write$ newline$
        #66 int.to.chr$ write$ newline$
        "one" num.names$ int.to.str$ write$ newline$
        "A and B" num.names$ int.to.str$ write$ newline$
        "Donald Ervin Knuth" #1 "{f.~}{ll}" format.name$ write$ newline$
        quote$ "x" * quote$ * write$ newline$
        "abc" width$ int.to.str$ write$ newline$
        "  " empty$ int.to.str$ write$ newline$
    }
    EXECUTE { main }
    "#).assert_modes_agree()
        .assert_output(concat!(
            "Hello World\n",
            "The {TeX}book: A guide\n",
            "ABC\n",
            "Knuth.Done!\n",
            "ell\n",
            "llo\n",
            "3\n",
            "He\n",
            "a b c ae\n",
            "65\n",
            "B\n",
            "1\n",
            "2\n",
            "D.~E. Knuth\n",
            "\"x\"\n",
            "1500\n",
            "1\n",
        ))
        .assert_errors(0);
}

#[test]
fn test_stack_builtins() {
    Tester::new_single_source_expect_ok("stack", "
    FUNCTION { main } {
        \"a\" \"b\" swap$ write$ write$
        \"c\" duplicate$ write$ write$
        \"x\" \"d\" swap$ pop$ write$
        stack$ skip$ top$
        newline$
    }
    EXECUTE { main }
    ").assert_modes_agree()
        .assert_output("abccd\n")
        .assert_warnings(0);
}

#[test]
fn test_variables_and_run_commands() {
    Tester::new("variables")
        .with_source("
        ENTRY { year } { num } { label }
        INTEGERS { total }
        STRINGS { last }

        FUNCTION { assign } {
            INTEGERS { n }
            cite$ \"-\" * year * 'label :=
            cite$ #2 #1 substring$ chr.to.int$ #48 - 'n :=
            n n + 'num :=
            total num + 'total :=
            label 'sort.key$ :=
        }

        FUNCTION { show } {
            label \" \" * num int.to.str$ * write$ newline$
            cite$ 'last :=
        }

        FUNCTION { finish } {
            \"total \" total int.to.str$ * write$ newline$
            \"last \" last * write$ newline$
        }

        READ
        ITERATE { assign }
        SORT
        ITERATE { show }
        REVERSE { show }
        EXECUTE { finish }
        ")
        .with_entry(Entry::new("b2", "misc").with_field("year", "1990"))
        .with_entry(Entry::new("a1", "misc").with_field("year", "1985"))
        .with_entry(Entry::new("c3", "misc").with_field("year", "2000"))
        .parse()
        .expect_ok()
        .assert_modes_agree()
        .assert_output(concat!(
            "a1-1985 2\n",
            "b2-1990 4\n",
            "c3-2000 6\n",
            "c3-2000 6\n",
            "b2-1990 4\n",
            "a1-1985 2\n",
            "total 12\n",
            "last a1\n",
        ))
        .assert_errors(0);
}

#[test]
fn test_control_flow() {
    Tester::new_single_source_expect_ok("if and while", "
    INTEGERS { i }
    FUNCTION { main } {
        #1 { \"yes\" } { \"no\" } if$ write$ newline$
        #0 { \"yes\" } { \"no\" } if$ write$ newline$
        #1 'i :=
        { i #4 < } { i int.to.str$ write$ i #1 + 'i := } while$
        newline$
    }
    EXECUTE { main }
    ").assert_modes_agree()
        .assert_output("yes\nno\n123\n");
}

#[test]
fn test_entry_builtins() {
    Tester::new("entries")
        .with_source(r#"
        ENTRY { title } { } { }
        FUNCTION { head } { preamble$ write$ newline$ }
        FUNCTION { show } {
            cite$ write$ " " write$ type$ write$ " " write$
            title missing$ { "-" } { title } if$ write$ newline$
        }
        READ
        EXECUTE { head }
        ITERATE { show }
        "#)
        .with_entry(Entry::new("k1", "Book").with_field("Title", "T1"))
        .with_entry(Entry::new("k2", "misc"))
        .with_preamble(r"\def\x{}")
        .parse()
        .expect_ok()
        .assert_modes_agree()
        .assert_output("\\def\\x{}\nk1 book T1\nk2 misc -\n")
        .assert_errors(0);
}

#[test]
fn test_call_type_dispatch() {
    Tester::new("call.type$")
        .with_source("
        FUNCTION { book } { \"B:\" cite$ * write$ newline$ }
        FUNCTION { default.type } { \"D:\" cite$ * write$ newline$ }
        READ
        ITERATE { call.type$ }
        ")
        .with_entry(Entry::new("one", "book"))
        .with_entry(Entry::new("two", "article"))
        .with_entry(Entry::new("three", "BOOK"))
        .parse()
        .expect_ok()
        .assert_modes_agree()
        .assert_output("B:one\nD:two\nB:three\n");
}
