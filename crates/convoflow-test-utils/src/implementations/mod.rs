//! Hand-written fakes of the collaborator traits.

mod recording;

pub use recording::{RecordedCall, RecordingCollaborators};
