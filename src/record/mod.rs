//! Generic store records and the codec protocol typed entities implement.
//!
//! A [`GenericRecord`] is a bag of dynamically typed fields plus store-owned
//! [`SystemFields`]. Entities keep those system fields only in archived form,
//! as a [`ConcurrencyToken`], and rebuild the record from it on every save.

mod codec;
mod owner;
mod token;
mod value;

pub use codec::{
    base_record, decode_header, optional_double, optional_string, optional_timestamp,
    required_asset, required_double, required_int, required_string, required_timestamp,
    DecodeError, RecordCodec,
};
pub use owner::{OwnerRef, Reference, ReferenceAction};
pub use token::{ConcurrencyToken, SystemFields, TokenError};
pub use value::{Asset, FieldValue, GenericRecord, RecordId, DEFAULT_ZONE, OWNER_FIELD};
