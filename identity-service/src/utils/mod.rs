pub mod password;

pub use password::{salted_digest, verify_digest, Password};
