use std::sync::Arc;

// ============================================================================
// Dictionary entries
// ============================================================================

#[derive(Clone)]
pub(crate) enum WordKind {
    Primitive(Prim),
    Colon(Arc<Vec<Instr>>),
    /// `VARIABLE` and `CREATE`: push the data-space address.
    Address(i64),
    Constant(i64),
    /// Index into the interpreter's host function table.
    Host(usize),
}

#[derive(Clone)]
pub(crate) struct Word {
    pub name: String,
    pub kind: WordKind,
    pub immediate: bool,
    /// Set while a colon definition is being compiled.
    pub hidden: bool,
}

/// Threaded code of a colon definition.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Instr {
    Call(usize),
    Lit(i64),
    /// Print a string compiled by `."`.
    Print(String),
    /// Compile a call to the word into the current definition (`POSTPONE`).
    Compile(usize),
    Branch(usize),
    ZeroBranch(usize),
    Do,
    QDo(usize),
    Loop(usize),
    PlusLoop(usize),
    Leave(usize),
    Exit,
}

/// Compile-time control-flow frames of the definition being built.
#[derive(Debug)]
pub(crate) enum Control {
    If(usize),
    Else(usize),
    Begin(usize),
    While(usize),
    Do { body: usize, leaves: Vec<usize> },
}

/// A colon definition under construction.
pub(crate) struct Definition {
    /// Dictionary index of the (hidden) entry being defined.
    pub index: usize,
    pub code: Vec<Instr>,
    pub control: Vec<Control>,
}

// ============================================================================
// Primitives
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Prim {
    // stack
    Dup,
    Drop,
    Swap,
    Over,
    Rot,
    MinusRot,
    Nip,
    Tuck,
    TwoDup,
    TwoDrop,
    TwoSwap,
    TwoOver,
    QDup,
    Pick,
    Depth,
    ToR,
    RFrom,
    RFetch,
    // arithmetic and logic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    DivMod,
    Negate,
    Abs,
    Min,
    Max,
    OnePlus,
    OneMinus,
    TwoStar,
    TwoSlash,
    And,
    Or,
    Xor,
    Invert,
    LShift,
    RShift,
    Eq,
    Ne,
    Lt,
    Gt,
    ULt,
    ZeroEq,
    ZeroLt,
    ZeroGt,
    ZeroNe,
    True,
    False,
    // memory
    Fetch,
    Store,
    CFetch,
    CStore,
    PlusStore,
    Here,
    Allot,
    Comma,
    CComma,
    Cells,
    CellPlus,
    Chars,
    CharPlus,
    CMove,
    Fill,
    State,
    Base,
    Decimal,
    Hex,
    // output
    Dot,
    UDot,
    DotR,
    Emit,
    Cr,
    Space,
    Spaces,
    Type,
    DotS,
    Words,
    // defining
    Colon,
    Semicolon,
    Variable,
    Constant,
    Create,
    Immediate,
    // compiling
    LeftBracket,
    RightBracket,
    Literal,
    SLiteral,
    Postpone,
    Recurse,
    Exit,
    If,
    Else,
    Then,
    Begin,
    Until,
    Again,
    While,
    Repeat,
    Do,
    QDo,
    Loop,
    PlusLoop,
    Leave,
    I,
    J,
    // parsing
    DotQuote,
    SQuote,
    DotParen,
    Paren,
    Backslash,
    Char,
    BracketChar,
    Parse,
    Evaluate,
    // control
    Quit,
    Abort,
    Bye,
}

/// Name, primitive and immediacy of every built-in word.
pub(crate) const PRIMITIVES: &[(&str, Prim, bool)] = &[
    ("DUP", Prim::Dup, false),
    ("DROP", Prim::Drop, false),
    ("SWAP", Prim::Swap, false),
    ("OVER", Prim::Over, false),
    ("ROT", Prim::Rot, false),
    ("-ROT", Prim::MinusRot, false),
    ("NIP", Prim::Nip, false),
    ("TUCK", Prim::Tuck, false),
    ("2DUP", Prim::TwoDup, false),
    ("2DROP", Prim::TwoDrop, false),
    ("2SWAP", Prim::TwoSwap, false),
    ("2OVER", Prim::TwoOver, false),
    ("?DUP", Prim::QDup, false),
    ("PICK", Prim::Pick, false),
    ("DEPTH", Prim::Depth, false),
    (">R", Prim::ToR, false),
    ("R>", Prim::RFrom, false),
    ("R@", Prim::RFetch, false),
    ("+", Prim::Add, false),
    ("-", Prim::Sub, false),
    ("*", Prim::Mul, false),
    ("/", Prim::Div, false),
    ("MOD", Prim::Mod, false),
    ("/MOD", Prim::DivMod, false),
    ("NEGATE", Prim::Negate, false),
    ("ABS", Prim::Abs, false),
    ("MIN", Prim::Min, false),
    ("MAX", Prim::Max, false),
    ("1+", Prim::OnePlus, false),
    ("1-", Prim::OneMinus, false),
    ("2*", Prim::TwoStar, false),
    ("2/", Prim::TwoSlash, false),
    ("AND", Prim::And, false),
    ("OR", Prim::Or, false),
    ("XOR", Prim::Xor, false),
    ("INVERT", Prim::Invert, false),
    ("LSHIFT", Prim::LShift, false),
    ("RSHIFT", Prim::RShift, false),
    ("=", Prim::Eq, false),
    ("<>", Prim::Ne, false),
    ("<", Prim::Lt, false),
    (">", Prim::Gt, false),
    ("U<", Prim::ULt, false),
    ("0=", Prim::ZeroEq, false),
    ("0<", Prim::ZeroLt, false),
    ("0>", Prim::ZeroGt, false),
    ("0<>", Prim::ZeroNe, false),
    ("TRUE", Prim::True, false),
    ("FALSE", Prim::False, false),
    ("@", Prim::Fetch, false),
    ("!", Prim::Store, false),
    ("C@", Prim::CFetch, false),
    ("C!", Prim::CStore, false),
    ("+!", Prim::PlusStore, false),
    ("HERE", Prim::Here, false),
    ("ALLOT", Prim::Allot, false),
    (",", Prim::Comma, false),
    ("C,", Prim::CComma, false),
    ("CELLS", Prim::Cells, false),
    ("CELL+", Prim::CellPlus, false),
    ("CHARS", Prim::Chars, false),
    ("CHAR+", Prim::CharPlus, false),
    ("CMOVE", Prim::CMove, false),
    ("MOVE", Prim::CMove, false),
    ("FILL", Prim::Fill, false),
    ("STATE", Prim::State, false),
    ("BASE", Prim::Base, false),
    ("DECIMAL", Prim::Decimal, false),
    ("HEX", Prim::Hex, false),
    (".", Prim::Dot, false),
    ("U.", Prim::UDot, false),
    (".R", Prim::DotR, false),
    ("EMIT", Prim::Emit, false),
    ("CR", Prim::Cr, false),
    ("SPACE", Prim::Space, false),
    ("SPACES", Prim::Spaces, false),
    ("TYPE", Prim::Type, false),
    (".S", Prim::DotS, false),
    ("WORDS", Prim::Words, false),
    (":", Prim::Colon, false),
    (";", Prim::Semicolon, true),
    ("VARIABLE", Prim::Variable, false),
    ("CONSTANT", Prim::Constant, false),
    ("CREATE", Prim::Create, false),
    ("IMMEDIATE", Prim::Immediate, false),
    ("[", Prim::LeftBracket, true),
    ("]", Prim::RightBracket, false),
    ("LITERAL", Prim::Literal, true),
    ("SLITERAL", Prim::SLiteral, true),
    ("POSTPONE", Prim::Postpone, true),
    ("RECURSE", Prim::Recurse, true),
    ("EXIT", Prim::Exit, true),
    ("IF", Prim::If, true),
    ("ELSE", Prim::Else, true),
    ("THEN", Prim::Then, true),
    ("BEGIN", Prim::Begin, true),
    ("UNTIL", Prim::Until, true),
    ("AGAIN", Prim::Again, true),
    ("WHILE", Prim::While, true),
    ("REPEAT", Prim::Repeat, true),
    ("DO", Prim::Do, true),
    ("?DO", Prim::QDo, true),
    ("LOOP", Prim::Loop, true),
    ("+LOOP", Prim::PlusLoop, true),
    ("LEAVE", Prim::Leave, true),
    ("I", Prim::I, false),
    ("J", Prim::J, false),
    (".\"", Prim::DotQuote, true),
    ("S\"", Prim::SQuote, true),
    (".(", Prim::DotParen, true),
    ("(", Prim::Paren, true),
    ("\\", Prim::Backslash, true),
    ("CHAR", Prim::Char, false),
    ("[CHAR]", Prim::BracketChar, true),
    ("PARSE", Prim::Parse, false),
    ("EVALUATE", Prim::Evaluate, false),
    ("QUIT", Prim::Quit, false),
    ("ABORT", Prim::Abort, false),
    ("BYE", Prim::Bye, false),
];
