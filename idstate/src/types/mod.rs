// Types Module Declarations
pub mod error;
pub mod field;
pub mod identifier;

pub use error::{ErrorKind, IdentityError, Result};
pub use field::FieldElement;
pub use identifier::{IdType, Identifier};
