//! Inter-task communication channels
//!
//! Host frames flow in through [`HOST_REQUESTS`] and replies flow back out
//! through [`HOST_REPLIES`]. The controller task is the only consumer of
//! requests and the only producer of replies.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use headsign_protocol::Frame;

/// Channel capacity for host requests
const REQUEST_CHANNEL_SIZE: usize = 4;

/// Channel capacity for host replies
const REPLY_CHANNEL_SIZE: usize = 4;

/// Complete frames received from the host
pub static HOST_REQUESTS: Channel<CriticalSectionRawMutex, Frame, REQUEST_CHANNEL_SIZE> =
    Channel::new();

/// Reply frames waiting to go out on the host UART
pub static HOST_REPLIES: Channel<CriticalSectionRawMutex, Frame, REPLY_CHANNEL_SIZE> =
    Channel::new();
