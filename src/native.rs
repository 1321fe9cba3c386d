//! cpal-backed microphone and speaker.
//!
//! cpal streams are not `Send`, so each stream is built and kept alive on its
//! own thread. Samples reach the speaker through a ring buffer and leave the
//! microphone through the session's frame channel.

mod input;
mod output;

pub use input::NativeMicrophone;
pub use output::{NativeAudioContext, NativeOutput};
pub use voice_tutor_utils::device::{get_available_inputs, get_available_outputs};
