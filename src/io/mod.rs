//! On-disk codecs and the staged commit used to replace store files together.

pub mod artifact;
pub mod commit;

pub use artifact::{
    decode_docstore, decode_vec_index, encode_docstore, encode_metadata, encode_vec_index,
    read_docstore, read_metadata, read_vec_index,
};
pub use commit::StagedCommit;
