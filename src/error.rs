use miette::Diagnostic;
use thiserror::Error;

/// Every way a statement can go wrong. None of these abort the run: the
/// interpreter reports the error, counts it, and substitutes the sentinel
/// value 1.0 so the enclosing expression can keep going.
#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
pub enum CalcError {
    #[error("bad token")]
    #[diagnostic(help("remove or correct the character: `{token}`"))]
    BadToken { token: char },

    #[error("primary expected")]
    PrimaryExpected,

    #[error("')' expected, but not found")]
    RightParenExpected,

    #[error("divide by zero")]
    DivideByZero,

    #[error("'(' expected in function call")]
    CallParenExpected,

    #[error("'(' expected in function definition")]
    DefinitionParenExpected,

    #[error("unknown function argument")]
    UnknownArgument,

    #[error("invalid function argument")]
    InvalidArgument,

    #[error("invalid number of arguments")]
    ArgumentCount,

    #[error("invalid function parameter")]
    InvalidParameter,

    #[error("undefined function; missing definition")]
    #[diagnostic(help("a function definition needs a `{{...}}` body after its parameter list"))]
    MissingBody,
}
