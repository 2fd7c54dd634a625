//! Authentication: password hashing, bearer tokens and the request extractor.

pub mod extractor;
pub mod password;
pub mod token;

pub use extractor::AuthenticatedUser;
pub use password::{hash_password, verify_password};
pub use token::{Claims, IssuedToken, Role, TokenService};
