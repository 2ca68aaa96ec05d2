//! Wire envelopes.
//!
//! Inbound events are CloudEvents-shaped JSON documents decoded by
//! [`decode`]; outbound results are built by [`OutboundResultBuilder`].

mod codec;
mod outbound;

pub use codec::{decode, salvage_id, Envelope, ORG_ID_KEY, UNKNOWN_ID};
pub use outbound::{
    HistoryData, HistoryDetails, HistoryResult, OutboundResultBuilder, DATA_CONTENT_TYPE,
    HISTORY_RESULT_TYPE, SPEC_VERSION,
};
