use thiserror::Error;

/// Result of evaluating an expression: either a value or an error.
pub type CalcResult = Result<crate::value::Value, CalcError>;

/// Broad classes of failure. Every error carries a stable numeric code;
/// the kind groups codes for user-level inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Numeric,
    Type,
    Shape,
    Lookup,
    Parse,
    Resource,
    User,
}

/// First user-assignable error code; codes below are reserved.
pub const USER_ERROR_BASE: u32 = 10001;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    // numeric
    #[error("division by zero")]
    DivByZero,
    #[error("zero raised to a negative power")]
    PowZeroNeg,
    #[error("{0}: argument out of domain")]
    Domain(&'static str),
    #[error("{0} requires an integer, got {1}")]
    NonInteger(&'static str, String),
    #[error("{0}: value too large")]
    Overflow(&'static str),
    #[error("invalid argument {1} for {0}")]
    InvalidArg(&'static str, String),

    // type
    #[error("operator {0} not defined for {1} and {2}")]
    TypeMismatch(&'static str, &'static str, &'static str),
    #[error("operator {0} not defined for {1}")]
    TypeMismatchOne(&'static str, &'static str),
    #[error("no {1} operator defined for object type {0}")]
    NoOperator(String, &'static str),
    #[error("value of type {0} cannot be used as an association key")]
    NotHashable(&'static str),

    // shape
    #[error("matrix dimension mismatch: {0}")]
    ShapeMismatch(String),
    #[error("index out of bounds")]
    IndexBounds,
    #[error("matrix is singular")]
    Singular,
    #[error("bad matrix definition: {0}")]
    MatrixDef(String),

    // lookup
    #[error("variable '{0}' not defined")]
    UndefinedVar(String),
    #[error("function '{0}' not defined")]
    UndefinedFunc(String),
    #[error("object type '{0}' not defined")]
    UndefinedObjType(String),
    #[error("no field '{1}' in object type {0}")]
    UndefinedField(String, String),

    // parse / compile
    #[error("parse error: {0}")]
    ParseFailed(String),
    #[error("'{0}' already defined")]
    Redefinition(String),
    #[error("label '{0}' not defined")]
    UndefinedLabel(String),
    #[error("expression is not assignable")]
    BadLvalue,
    #[error("'{0}' expects at most {1} arguments")]
    TooManyArgs(String, usize),
    #[error("'{0}' expects at least {1} arguments")]
    TooFewArgs(String, usize),
    #[error("static initializer for '{0}' must be a constant")]
    StaticInit(String),
    #[error("'{0}' cannot be used outside a loop")]
    BadLoopControl(&'static str),

    // resource
    #[error("cannot open file '{0}'")]
    FileOpen(String),
    #[error("file access denied by permission mode")]
    FileMode,
    #[error("file is not open")]
    FileClosed,
    #[error("i/o failure: {0}")]
    IoFailed(String),

    // user / control
    #[error("error {0}")]
    UserError(u32, Option<String>),
    #[error("interrupted")]
    Interrupted,
}

impl CalcError {
    pub fn kind(&self) -> ErrorKind {
        use CalcError::*;
        match self {
            DivByZero | PowZeroNeg | Domain(..) | NonInteger(..) | Overflow(..)
            | InvalidArg(..) => ErrorKind::Numeric,
            TypeMismatch(..) | TypeMismatchOne(..) | NoOperator(..) | NotHashable(..) => {
                ErrorKind::Type
            }
            ShapeMismatch(..) | IndexBounds | Singular | MatrixDef(..) => ErrorKind::Shape,
            UndefinedVar(..) | UndefinedFunc(..) | UndefinedObjType(..) | UndefinedField(..) => {
                ErrorKind::Lookup
            }
            ParseFailed(..) | Redefinition(..) | UndefinedLabel(..) | BadLvalue
            | TooManyArgs(..) | TooFewArgs(..) | StaticInit(..) | BadLoopControl(..) => {
                ErrorKind::Parse
            }
            FileOpen(..) | FileMode | FileClosed | IoFailed(..) => ErrorKind::Resource,
            UserError(..) | Interrupted => ErrorKind::User,
        }
    }

    /// Stable numeric code for the error value channel.
    pub fn code(&self) -> u32 {
        use CalcError::*;
        match self {
            DivByZero => 101,
            PowZeroNeg => 102,
            Domain(..) => 103,
            NonInteger(..) => 104,
            Overflow(..) => 105,
            InvalidArg(..) => 106,

            TypeMismatch(..) => 201,
            TypeMismatchOne(..) => 202,
            NoOperator(..) => 203,
            NotHashable(..) => 204,

            ShapeMismatch(..) => 301,
            IndexBounds => 302,
            Singular => 303,
            MatrixDef(..) => 304,

            UndefinedVar(..) => 401,
            UndefinedFunc(..) => 402,
            UndefinedObjType(..) => 403,
            UndefinedField(..) => 404,

            ParseFailed(..) => 501,
            Redefinition(..) => 502,
            UndefinedLabel(..) => 503,
            BadLvalue => 504,
            TooManyArgs(..) => 505,
            TooFewArgs(..) => 506,
            StaticInit(..) => 507,
            BadLoopControl(..) => 508,

            FileOpen(..) => 601,
            FileMode => 602,
            FileClosed => 603,
            IoFailed(..) => 604,

            UserError(code, _) => *code,
            Interrupted => 901,
        }
    }
}

/// Short description for a numeric code, for the `strerror` builtin.
pub fn describe_code(code: u32) -> &'static str {
    match code {
        0 => "no error",
        101 => "division by zero",
        102 => "zero raised to a negative power",
        103 => "argument out of domain",
        104 => "integer required",
        105 => "value too large",
        106 => "invalid argument",
        201 | 202 => "operator not defined for operand types",
        203 => "no operator override for object type",
        204 => "value cannot be used as an association key",
        301 => "matrix dimension mismatch",
        302 => "index out of bounds",
        303 => "matrix is singular",
        304 => "bad matrix definition",
        401 => "variable not defined",
        402 => "function not defined",
        403 => "object type not defined",
        404 => "object field not defined",
        501..=508 => "compile error",
        601 => "cannot open file",
        602 => "file access denied",
        603 => "file is not open",
        604 => "i/o failure",
        901 => "interrupted",
        c if c >= USER_ERROR_BASE => "user error",
        _ => "unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_kinds() {
        assert_eq!(CalcError::DivByZero.kind(), ErrorKind::Numeric);
        assert_eq!(CalcError::DivByZero.code(), 101);
        assert_eq!(CalcError::IndexBounds.kind(), ErrorKind::Shape);
        assert_eq!(CalcError::UserError(12345, None).kind(), ErrorKind::User);
        assert_eq!(CalcError::UserError(12345, None).code(), 12345);
    }

    #[test]
    fn user_codes_start_above_reserved_range() {
        assert!(USER_ERROR_BASE > 901);
        assert_eq!(describe_code(USER_ERROR_BASE), "user error");
        assert_eq!(describe_code(0), "no error");
    }
}
