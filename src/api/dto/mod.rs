//! Data Transfer Objects for REST request/response serialization.
//!
//! Identifiers are plain JSON numbers on the way out. Incoming ids stay
//! strings so the service layer reports malformed ones as validation
//! errors.

pub mod category_dto;
pub mod common_dto;
pub mod inbox_dto;
pub mod product_dto;

pub use category_dto::*;
pub use common_dto::*;
pub use inbox_dto::*;
pub use product_dto::*;
