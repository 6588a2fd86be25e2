#![forbid(unsafe_code)]

use snafu::{Location, Snafu};

pub mod tracker;

pub use tally_common::message_id::{BatchAckTracker, MessageId, TrackingMessageId};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("cumulative acks tracker has shutdown"))]
    Shutdown {
        #[snafu(implicit)]
        location: Location,
    },
}
