pub mod binary;
pub mod codec;
pub mod container;
pub mod datum;
pub mod error;
pub mod resolve;
pub mod schema;
pub mod value;

pub use codec::{get_codec, Codec, CodecId, CodecRegistry};
pub use container::{Reader, ReaderOptions, Writer, WriterOptions};
pub use datum::{from_datum, to_datum, write_datum, DatumReader, DecodeLimits, Encoder};
pub use error::{Error, Result};
pub use resolve::ResolvedSchema;
pub use schema::{Schema, SchemaBuilder};
pub use value::Value;
