pub mod manifest;
pub mod options;
pub mod protocol;

pub use manifest::{ContentsConfig, KernelManifest, ManifestError};
pub use options::KernelOptions;
pub use protocol::{
    CompleteReply, CompleteRequest, ExecuteReply, ExecuteRequest, KernelEvent, KernelInfoReply,
    StreamChunk,
};
