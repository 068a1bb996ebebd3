//! converge-core: shared domain types for the Converge reconciler.
//!
//! Everything here is plain data: the entity identifier codec, the
//! compression codec registry, the strongly-typed flat configuration the
//! host hands us, and the diagnostic records we hand back. No networking,
//! no clocks. The reconciler crates build on top of these.

pub mod codec;
pub mod config;
pub mod diag;
pub mod entity;
pub mod error;

pub use codec::{ALLOWED_CODECS, Codec, DEFAULT_TOPIC_CODECS};
pub use config::*;
pub use diag::{Diagnostic, Diagnostics, Severity};
pub use entity::{Endpoint, EntityId};
pub use error::{ConfigError, ConfigResult};
