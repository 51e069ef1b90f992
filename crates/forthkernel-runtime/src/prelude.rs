//! Bootstrap program run once per session, before the first request.

/// Prints `interpret` or `compile`.
pub const MODE_WORD: &str = "KERNEL-MODE";

/// Prints the status line: `<depth> v… ok`, showing at most the top four
/// stack values deepest first, or `compiling` while a definition is open.
pub const STATUS_WORD: &str = "KERNEL-STATUS";

pub const WORDS_QUERY: &str = "WORDS";

// Both query words are immediate so they run, rather than get compiled,
// when a cell leaves a definition open.
const CORE: &str = r#"
: KERNEL-MODE STATE @ IF ." compile" ELSE ." interpret" THEN ; IMMEDIATE
: KERNEL-STATUS STATE @ IF ." compiling" EXIT THEN
  ." <" DEPTH 0 .R ." > "
  DEPTH 4 MIN DUP 0 ?DO DUP I - PICK . LOOP DROP
  ." ok" ; IMMEDIATE
: S+ 2OVER NIP OVER + HERE SWAP DUP ALLOT >R >R
  2SWAP R@ SWAP DUP >R CMOVE R> R@ + SWAP CMOVE R> R> ;
"#;

/// Prelude source for a session whose capability table binds `bindings`.
///
/// Each binding also gets a string-literal form, e.g. `LOG" text"`. The
/// form is immediate: inside a definition it compiles the text as a literal
/// followed by a call to the binding.
pub fn source(bindings: &[&str]) -> String {
    let mut src = String::from(CORE);
    for name in bindings {
        src.push_str(&format!(
            ": {name}\" [CHAR] \" PARSE STATE @ IF POSTPONE SLITERAL POSTPONE {name} ELSE {name} THEN ; IMMEDIATE\n"
        ));
    }
    src
}
