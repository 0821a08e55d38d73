use crate::pitch::GranularPitchShifter;
use crate::source::SourceVoice;

/// Control → render messages. Instances are fully built on the control
/// context; the render context only moves the boxes into place.
pub enum ChainCommand {
    StartSource(Box<SourceVoice>),
    InstallPitch(Box<GranularPitchShifter>),
    RemovePitch,
}

/// Render → control: instances the render context no longer uses.
/// Dropped on the control context so the render context never frees memory.
pub enum Garbage {
    Source(Box<SourceVoice>),
    Pitch(Box<GranularPitchShifter>),
}

impl Garbage {
    pub fn label(&self) -> &'static str {
        match self {
            Garbage::Source(_) => "source",
            Garbage::Pitch(_) => "pitch",
        }
    }
}
