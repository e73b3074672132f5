// src/errors/sema.rs
//! Semantic analysis errors (E2xxx): name/type errors, world-coherence
//! errors, template-merge errors, and compile-time evaluation errors.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum SemaError {
    // --- Names and types ---
    #[error("name '{name}' is not defined")]
    #[diagnostic(code(E2001))]
    NameNotDefined {
        name: String,
        #[label("undefined name")]
        span: SourceSpan,
    },

    #[error("'{ty}' has no attribute '{attr}'")]
    #[diagnostic(code(E2002))]
    HasNoAttribute {
        ty: String,
        attr: String,
        #[label("unknown attribute")]
        span: SourceSpan,
    },

    #[error("cannot assign '{found}' to variable of type '{expected}'")]
    #[diagnostic(code(E2003))]
    WrongAssignType {
        expected: String,
        found: String,
        #[label("wrong type")]
        span: SourceSpan,
    },

    #[error("argument '{arg}' expects '{expected}', found '{found}'")]
    #[diagnostic(code(E2004))]
    WrongArgType {
        arg: String,
        expected: String,
        found: String,
        #[label("wrong argument type")]
        span: SourceSpan,
    },

    #[error("invalid operand for '{op}': {operands}")]
    #[diagnostic(code(E2005))]
    InvalidOperand {
        op: String,
        operands: String,
        #[label("unsupported operand type")]
        span: SourceSpan,
    },

    #[error("'{ty}' is not callable")]
    #[diagnostic(code(E2006))]
    Uncallable {
        ty: String,
        #[label("cannot be called")]
        span: SourceSpan,
    },

    #[error("'{ty}' is not iterable at compile time")]
    #[diagnostic(code(E2007), help("for-in iterates compile-time lists and maps"))]
    NotIterable {
        ty: String,
        #[label("not iterable")]
        span: SourceSpan,
    },

    #[error("'{ty}' is not subscriptable")]
    #[diagnostic(code(E2008))]
    NoGetItem {
        ty: String,
        #[label("cannot be indexed")]
        span: SourceSpan,
    },

    #[error("'{ty}' is not a valid type specifier")]
    #[diagnostic(code(E2009))]
    InvalidTypeSpec {
        ty: String,
        #[label("expected a type here")]
        span: SourceSpan,
    },

    #[error("type '{ty}' has no runtime storage")]
    #[diagnostic(code(E2010), help("only types with a runtime form can be declared as variables"))]
    NotStorableType {
        ty: String,
        #[label("compile-time-only type")]
        span: SourceSpan,
    },

    #[error("name '{name}' is already defined in this scope")]
    #[diagnostic(code(E2011))]
    ShadowedName {
        name: String,
        #[label("redeclaration")]
        span: SourceSpan,
    },

    #[error("cannot assign to compile-time constant '{name}'")]
    #[diagnostic(code(E2012))]
    AssignToConst {
        name: String,
        #[label("constant binding")]
        span: SourceSpan,
    },

    // --- World coherence ---
    #[error("value of '{name}' is not known at compile time")]
    #[diagnostic(code(E2020))]
    NotConstName {
        name: String,
        #[label("runtime value in compile-time position")]
        span: SourceSpan,
    },

    #[error("attribute '{attr}' is not known at compile time")]
    #[diagnostic(code(E2021))]
    NotConstAttr {
        attr: String,
        #[label("runtime attribute in compile-time position")]
        span: SourceSpan,
    },

    #[error("argument '{arg}' must be a compile-time constant")]
    #[diagnostic(code(E2022))]
    ArgNotConst {
        arg: String,
        #[label("not a constant")]
        span: SourceSpan,
    },

    #[error("result of a compile-time function must be a compile-time value")]
    #[diagnostic(code(E2023))]
    NonRtResult {
        #[label("runtime value")]
        span: SourceSpan,
    },

    #[error("runtime name '{name}' is not accessible in a compile-time context")]
    #[diagnostic(code(E2024))]
    NonRtName {
        name: String,
        #[label("crosses into compile-time world")]
        span: SourceSpan,
    },

    #[error("cannot take a reference to this expression")]
    #[diagnostic(code(E2025), help("references need an assignable target"))]
    CantRef {
        #[label("not assignable")]
        span: SourceSpan,
    },

    #[error("reference argument '{arg}' requires an assignable expression")]
    #[diagnostic(code(E2026))]
    CantRefArg {
        arg: String,
        #[label("not assignable")]
        span: SourceSpan,
    },

    // --- Control flow ---
    #[error("'if' condition must be 'bool', found '{found}'")]
    #[diagnostic(code(E2030))]
    WrongIfCondition {
        found: String,
        #[label("expected bool")]
        span: SourceSpan,
    },

    #[error("'while' condition must be 'bool', found '{found}'")]
    #[diagnostic(code(E2031))]
    WrongWhileCondition {
        found: String,
        #[label("expected bool")]
        span: SourceSpan,
    },

    #[error("'while' condition is always true")]
    #[diagnostic(code(E2032), help("a constant-true loop would never terminate"))]
    EndlessWhileLoop {
        #[label("always true")]
        span: SourceSpan,
    },

    #[error("'result' outside of a function body")]
    #[diagnostic(code(E2033))]
    ResultOutOfScope {
        #[label("no enclosing function")]
        span: SourceSpan,
    },

    #[error("'new(...)' outside of a 'new' method")]
    #[diagnostic(code(E2034))]
    NewOutOfScope {
        #[label("no enclosing 'new' method")]
        span: SourceSpan,
    },

    #[error("this statement requires a runtime context")]
    #[diagnostic(code(E2035), help("compile-time function bodies cannot emit commands"))]
    RuntimeStmtInConstContext {
        #[label("inside a compile-time function")]
        span: SourceSpan,
    },

    // --- Calls ---
    #[error("too many positional arguments")]
    #[diagnostic(code(E2040))]
    TooManyArgs {
        #[label("in this call")]
        span: SourceSpan,
    },

    #[error("unexpected keyword argument '{arg}'")]
    #[diagnostic(code(E2041))]
    UnexpectedKeywordArg {
        arg: String,
        #[label("unknown parameter")]
        span: SourceSpan,
    },

    #[error("multiple values for argument '{arg}'")]
    #[diagnostic(code(E2042))]
    ArgMultipleValues {
        arg: String,
        #[label("already given positionally")]
        span: SourceSpan,
    },

    #[error("missing required argument '{arg}'")]
    #[diagnostic(code(E2043))]
    MissingArg {
        arg: String,
        #[label("in this call")]
        span: SourceSpan,
    },

    #[error("default for parameter '{arg}' must be a compile-time constant")]
    #[diagnostic(code(E2044))]
    NonRefArgDefaultNotConst {
        arg: String,
        #[label("not a constant")]
        span: SourceSpan,
    },

    #[error("default for compile-time parameter '{arg}' must be a constant")]
    #[diagnostic(code(E2045))]
    ArgDefaultNotConst {
        arg: String,
        #[label("not a constant")]
        span: SourceSpan,
    },

    #[error("function with const or reference result may only have one 'result' statement")]
    #[diagnostic(code(E2046))]
    MultipleResults {
        #[label("second 'result' here")]
        span: SourceSpan,
    },

    #[error("compile-time functions cannot be non-static entity methods")]
    #[diagnostic(code(E2047))]
    ConstMethodNotStatic {
        #[label("mark this method 'static' or change its flavor")]
        span: SourceSpan,
    },

    #[error("parameter '{arg}' cannot use this port with this function flavor")]
    #[diagnostic(code(E2048))]
    InvalidParamPort {
        arg: String,
        #[label("port not allowed here")]
        span: SourceSpan,
    },

    // --- Entity and struct templates ---
    #[error("cannot create a consistent method resolution order")]
    #[diagnostic(code(E2050))]
    Mro {
        #[label("conflicting base templates")]
        span: SourceSpan,
    },

    #[error("attribute '{attr}' is defined more than once along the template bases")]
    #[diagnostic(code(E2051))]
    EFieldMultipleDefs {
        attr: String,
        #[label("conflicting attribute")]
        span: SourceSpan,
    },

    #[error("field '{attr}' is defined more than once in the struct")]
    #[diagnostic(code(E2052))]
    SFieldMultipleDefs {
        attr: String,
        #[label("conflicting field")]
        span: SourceSpan,
    },

    #[error("'{name}' is both an attribute and a method")]
    #[diagnostic(code(E2053))]
    MethodAttrConflict {
        name: String,
        #[label("name clash")]
        span: SourceSpan,
    },

    #[error("more than one 'new' method along the template bases")]
    #[diagnostic(code(E2054))]
    MultipleNewMethods {
        #[label("extra 'new' method")]
        span: SourceSpan,
    },

    #[error("virtual method '{name}' is defined by multiple unrelated bases")]
    #[diagnostic(code(E2055))]
    MultipleVirtualMethod {
        name: String,
        #[label("conflicting virtual definitions")]
        span: SourceSpan,
    },

    #[error("override of '{name}' changes the result type: expected '{expected}', found '{found}'")]
    #[diagnostic(code(E2056))]
    OverrideResultMismatch {
        name: String,
        expected: String,
        found: String,
        #[label("result type differs from the virtual method")]
        span: SourceSpan,
    },

    #[error("method '{name}' shadows a virtual method but is not marked 'override'")]
    #[diagnostic(code(E2057))]
    OverrideQualifier {
        name: String,
        #[label("add the 'override' qualifier")]
        span: SourceSpan,
    },

    #[error("method '{name}' is marked 'override' but overrides nothing")]
    #[diagnostic(code(E2058))]
    NotOverriding {
        name: String,
        #[label("no virtual method of this name in any base")]
        span: SourceSpan,
    },

    #[error("instance method '{name}' shadows a static method")]
    #[diagnostic(code(E2059))]
    InstOverrideStatic {
        name: String,
        #[label("base defines this as static")]
        span: SourceSpan,
    },

    #[error("static method '{name}' shadows an instance method")]
    #[diagnostic(code(E2060))]
    StaticOverrideInst {
        name: String,
        #[label("base defines this as non-static")]
        span: SourceSpan,
    },

    #[error("method '{name}' shadows a non-virtual method")]
    #[diagnostic(code(E2061))]
    VirtualOverrideNonVirtual {
        name: String,
        #[label("base method is not virtual")]
        span: SourceSpan,
    },

    #[error("struct field '{attr}' of type '{ty}' cannot be stored on an entity")]
    #[diagnostic(code(E2062))]
    UnsupportedEFieldInStruct {
        attr: String,
        ty: String,
        #[label("unsupported field type")]
        span: SourceSpan,
    },

    #[error("type '{ty}' cannot be an entity attribute")]
    #[diagnostic(code(E2063))]
    UnsupportedEField {
        ty: String,
        #[label("unsupported attribute type")]
        span: SourceSpan,
    },

    #[error("type '{ty}' cannot be a struct field")]
    #[diagnostic(code(E2064))]
    UnsupportedSField {
        ty: String,
        #[label("unsupported field type")]
        span: SourceSpan,
    },

    #[error("invalid entity meta '@{name}'")]
    #[diagnostic(code(E2065), help("known metas are '@type' and '@position'"))]
    InvalidEntityMeta {
        name: String,
        #[label("unknown meta")]
        span: SourceSpan,
    },

    #[error("entity meta '@{name}' should be {expected}")]
    #[diagnostic(code(E2066))]
    EntityMetaType {
        name: String,
        expected: String,
        #[label("wrong meta value")]
        span: SourceSpan,
    },

    #[error("initializer of an entity must not produce a result")]
    #[diagnostic(code(E2067))]
    InitializerResult {
        #[label("'new' method returns a value")]
        span: SourceSpan,
    },

    #[error("virtual and override methods must be runtime functions")]
    #[diagnostic(code(E2068))]
    VirtualMethodFlavor {
        #[label("inline or compile-time flavor here")]
        span: SourceSpan,
    },

    // --- Compile-time evaluation ---
    #[error("compile-time arithmetic error: {msg}")]
    #[diagnostic(code(E2070))]
    ConstArithmetic {
        msg: String,
        #[label("evaluated here")]
        span: SourceSpan,
    },

    #[error("list index {index} out of bounds (length {len})")]
    #[diagnostic(code(E2071))]
    ListIndexOutOfBounds {
        index: i64,
        len: usize,
        #[label("out of bounds")]
        span: SourceSpan,
    },

    #[error("map key {key} not found")]
    #[diagnostic(code(E2072))]
    MapKeyNotFound {
        key: String,
        #[label("missing key")]
        span: SourceSpan,
    },

    #[error("'{ty}' cannot be used as a map key")]
    #[diagnostic(code(E2073))]
    InvalidMapKey {
        ty: String,
        #[label("unhashable key")]
        span: SourceSpan,
    },

    #[error("list repetition factor must be an integer literal")]
    #[diagnostic(code(E2074))]
    ListMulTimesNonLiteral {
        #[label("not a literal integer")]
        span: SourceSpan,
    },

    #[error("'${{{name}}}' does not name a formattable compile-time constant")]
    #[diagnostic(code(E2075))]
    InvalidCommandInterp {
        name: String,
        #[label("cannot appear in a raw command")]
        span: SourceSpan,
    },
}
