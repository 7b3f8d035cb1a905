// Claim module: slot layout, schemas and the JSON form used on the wire.
pub mod codec;
pub mod json;
pub mod schema;

pub use codec::{Claim, ClaimFields, Subject, CLAIM_BYTES};
pub use schema::{CredentialSchema, SchemaHash, SchemaRegistry, SlotIndex};
