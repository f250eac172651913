//! OPK pack-image codec (C9): header/checksum framing in `checksum`,
//! record framing in `records`, and the envelope-level `build`/`parse` in
//! `codec`.

pub mod checksum;
pub mod codec;
pub mod records;

pub use codec::{LengthConvention, Opk, PackHeader};
pub use records::{is_valid_procedure_name, Record};
