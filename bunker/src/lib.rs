// SPDX-License-Identifier: BSD-3-Clause

//! The encrypted persisted-state lifecycle (C4), principal registry (C5),
//! and permission oracle (C6).

pub mod document;
pub mod errors;
pub mod permissions;
pub mod principals;
pub mod secrets;
pub mod store;
pub mod unlock;
pub mod validate;

pub use document::BunkerDocument;
pub use errors::{BunkerError, ValidationError};
pub use permissions::PermissionOracle;
pub use principals::{Principal, PrincipalClass, PrincipalRegistry};
pub use store::BunkerStore;
pub use validate::ValidatedBunker;
