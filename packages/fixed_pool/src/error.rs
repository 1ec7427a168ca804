use thiserror::Error;

/// Configuration faults detected while negotiating the one chunk a pool is built on.
///
/// These are never returned for ordinary capacity exhaustion, which is signaled by an empty
/// result instead. An error here means the block size or alignment of the chunk source was
/// derived inconsistently with the pool that consumes it, and there is no fallback path.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The first chunk request did not match the size of the reserved block exactly.
    #[error(
        "chunk request of {requested} bytes does not match the reserved block of {reserved} bytes"
    )]
    BlockSizeMismatch {
        /// The size, in bytes, that the chunk consumer asked for.
        requested: usize,

        /// The size, in bytes, of the reserved block.
        reserved: usize,
    },

    /// The first chunk request needs a stricter alignment than the reserved block provides.
    #[error(
        "chunk request aligned to {requested} bytes cannot be served from a block aligned to {reserved} bytes"
    )]
    AlignmentUnsatisfiable {
        /// The alignment, in bytes, that the chunk consumer asked for.
        requested: usize,

        /// The alignment, in bytes, of the reserved block.
        reserved: usize,
    },
}

/// A specialized `Result` type for chunk negotiation, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn size_mismatch_names_both_sizes() {
        let error = Error::BlockSizeMismatch {
            requested: 48,
            reserved: 64,
        };

        let message = error.to_string();
        assert!(message.contains("48"));
        assert!(message.contains("64"));
    }

    #[test]
    fn alignment_error_names_both_alignments() {
        let error = Error::AlignmentUnsatisfiable {
            requested: 128,
            reserved: 64,
        };

        let message = error.to_string();
        assert!(message.contains("128"));
        assert!(message.contains("64"));
    }
}
