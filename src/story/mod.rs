pub mod composer;
pub mod describer;

pub use composer::NarrativeComposer;
pub use describer::VisionDescriber;
