/// cross_mode.rs
///
/// Runs a reduced version of `plain.bst` against a few entries with the
/// interpreter and as a compiled program. Besides the built-ins it exercises
/// the output state machine, name formatting in a loop, sorting and
/// dispatching on the entry type.

use super::*;
use crate::bst::compiler::ProgramCommand;

pub(super) const MINI_BST: &str = r##"
ENTRY { author title journal year pages } { } { }

INTEGERS { output.state before.all mid.sentence after.block }
INTEGERS { nameptr namesleft numnames }
STRINGS { s t }

FUNCTION { init.state.consts } {
    #0 'before.all :=
    #1 'mid.sentence :=
    #2 'after.block :=
}

FUNCTION { output.nonnull } {
    's :=
    output.state mid.sentence =
        { ", " * write$ }
        { output.state after.block =
            { add.period$ write$
              newline$
              "\newblock " write$
            }
            { output.state before.all =
                'write$
                { add.period$ " " * write$ }
              if$
            }
          if$
          mid.sentence 'output.state :=
        }
    if$
    s
}

FUNCTION { output } {
    duplicate$ empty$
        'pop$
        'output.nonnull
    if$
}

FUNCTION { output.check } {
    't :=
    duplicate$ empty$
        { pop$ "empty " t * " in " * cite$ * warning$ }
        'output.nonnull
    if$
}

FUNCTION { output.bibitem } {
    newline$
    "\bibitem{" write$
    cite$ write$
    "}" write$
    newline$
    ""
    before.all 'output.state :=
}

FUNCTION { fin.entry } {
    add.period$
    write$
    newline$
}

FUNCTION { new.block } {
    output.state before.all =
        'skip$
        { after.block 'output.state := }
    if$
}

% The accumulator is pushed before the loop, so the stack has the same
% depth in every iteration
FUNCTION { format.names } {
    's :=
    #1 'nameptr :=
    s num.names$ 'numnames :=
    numnames 'namesleft :=
    ""
    { namesleft #0 > }
    { s nameptr "{ff~}{vv~}{ll}{, jj}" format.name$ 't :=
      nameptr #1 >
        { namesleft #1 >
            { ", " * t * }
            { numnames #2 >
                { "," * }
                'skip$
              if$
              " and " * t *
            }
          if$
        }
        { t * }
      if$
      nameptr #1 + 'nameptr :=
      namesleft #1 - 'namesleft :=
    }
    while$
}

FUNCTION { format.authors } {
    author empty$
        { "" }
        { author format.names }
    if$
}

FUNCTION { format.title } {
    title empty$
        { "" }
        { title "t" change.case$ }
    if$
}

FUNCTION { format.pages } {
    pages empty$
        { "" }
        { "pages " pages * }
    if$
}

FUNCTION { article } {
    output.bibitem
    format.authors "author" output.check
    new.block
    format.title "title" output.check
    new.block
    journal "journal" output.check
    format.pages output
    year "year" output.check
    fin.entry
}

FUNCTION { misc } {
    output.bibitem
    format.authors output
    new.block
    format.title output
    fin.entry
}

FUNCTION { default.type } { misc }

FUNCTION { presort } {
    author #1 "{ll}" format.name$ "l" change.case$
    'sort.key$ :=
}

FUNCTION { begin.bib } {
    preamble$ empty$
        'skip$
        { preamble$ write$ newline$ }
    if$
    "\begin{thebibliography}{99}" write$ newline$
}

FUNCTION { end.bib } {
    newline$
    "\end{thebibliography}" write$ newline$
}

READ
EXECUTE { init.state.consts }
ITERATE { presort }
SORT
EXECUTE { begin.bib }
ITERATE { call.type$ }
EXECUTE { end.bib }
"##;

pub(super) fn mini_entries() -> Vec<Entry> {
    vec![
        Entry::new("knuth84", "article")
            .with_field("author", "Donald E. Knuth")
            .with_field("title", "Literate Programming")
            .with_field("journal", "The Computer Journal")
            .with_field("year", "1984")
            .with_field("pages", "97--111"),
        Entry::new("lamport86", "book")
            .with_field("author", "Leslie Lamport")
            .with_field("title", "LaTeX: A Document Preparation System")
            .with_field("year", "1986"),
        Entry::new("gkp", "article")
            .with_field("author", "Ronald L. Graham and Donald E. Knuth and Oren Patashnik")
            .with_field("title", "Concrete Mathematics")
            .with_field("year", "1989"),
    ]
}

pub(super) fn mini_tester(test_name: &str) -> Tester {
    mini_entries().into_iter()
        .fold(Tester::new(test_name).with_source(MINI_BST), |tester, entry| tester.with_entry(entry))
}

pub(super) const MINI_OUTPUT: &str = concat!(
    r"\begin{thebibliography}{99}", "\n",
    "\n",
    r"\bibitem{gkp}", "\n",
    "Ronald~L. Graham, Donald~E. Knuth, and Oren Patashnik.\n",
    r"\newblock Concrete mathematics.", "\n",
    r"\newblock 1989.", "\n",
    "\n",
    r"\bibitem{knuth84}", "\n",
    "Donald~E. Knuth.\n",
    r"\newblock Literate programming.", "\n",
    r"\newblock The Computer Journal, pages 97--111, 1984.", "\n",
    "\n",
    r"\bibitem{lamport86}", "\n",
    "Leslie Lamport.\n",
    r"\newblock Latex: A document preparation system.", "\n",
    "\n",
    r"\end{thebibliography}", "\n",
);

#[test]
fn test_bibliography_in_all_modes() {
    mini_tester("mini bibliography")
        .parse()
        .expect_ok()
        .assert_modes_agree()
        .assert_output(MINI_OUTPUT)
        .assert_errors(0)
        .assert_warnings(1)
        .assert_tally("(There was 1 warning)")
        .assert_any_diagnostic_has("Warning--empty journal in gkp");
}

#[test]
fn test_bibliography_with_preamble() {
    let run = mini_tester("mini with preamble")
        .with_preamble(r"\newcommand{\noopsort}[1]{}")
        .parse()
        .expect_ok()
        .assert_modes_agree();
    assert!(run.output().starts_with("\\newcommand{\\noopsort}[1]{}\n\\begin{thebibliography}{99}\n"));
}

#[test]
fn test_sorting_orders_the_citations() {
    let run = mini_tester("mini order").parse().expect_ok().interpret();
    let order: Vec<&str> = run.output().lines()
        .filter_map(|line| line.strip_prefix(r"\bibitem{"))
        .map(|rest| rest.trim_end_matches('}'))
        .collect();
    assert_eq!(order, ["gkp", "knuth84", "lamport86"]);
}

#[test]
fn test_compiled_structure() {
    mini_tester("mini program")
        .parse()
        .expect_ok()
        .compile()
        .for_function("format.names", |f| {
            f.assert_params(1).assert_returns(Some(ArgKind::String)).assert_touches_entry(false);
        })
        .for_function("output.nonnull", |f| {
            f.assert_params(2).assert_returns(Some(ArgKind::String));
        })
        .for_function("output", |f| {
            f.assert_params(2).assert_returns(Some(ArgKind::Any)).assert_calls(&["output.nonnull"]);
        })
        .for_function("article", |f| {
            f.assert_params(0).assert_returns(None).assert_touches_entry(true);
        })
        .for_function("call.type$", |f| {
            f.assert_params(0).assert_returns(None);
        })
        .assert_emits(&[
            "pub fn run(m: &mut Machine) -> Result<(), RunError> {",
            "pub fn declare(m: &mut Machine) {",
        ]);
}

#[test]
fn test_compiled_commands() {
    let program = mini_tester("mini commands").parse().expect_ok().compile();
    let commands = &program.program().commands;
    assert_eq!(commands, &vec![
        ProgramCommand::Execute("init.state.consts".into()),
        ProgramCommand::Iterate("presort".into()),
        ProgramCommand::Sort,
        ProgramCommand::Execute("begin.bib".into()),
        ProgramCommand::Iterate("call.type$".into()),
        ProgramCommand::Execute("end.bib".into()),
    ]);
}
