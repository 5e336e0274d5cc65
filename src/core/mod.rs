pub mod context;
pub mod realtime;

pub use context::{
    Classification, Classifier, ContextError, ContextResult, ContextRetriever, DocumentStore,
    Embedder, InstructionComposer, RetrievedContext, Snippet,
};
pub use realtime::{
    BridgeEvent, BridgeHandle, ClientEvent, EndpointSettings, RealtimeError, RealtimeResult,
    SessionConfig, UpstreamBridge,
};
