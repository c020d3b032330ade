mod card;
pub mod codec;
mod command;
mod init;
mod regs;
mod session;
#[cfg(test)]
mod tests;

pub use codec::{CommandType, HcrQuery, ResponseType, SdioRequest, SdioResponse};
pub use command::{DataBuffer, SdioCommand};
pub use regs::BitsState;
pub use session::*;
