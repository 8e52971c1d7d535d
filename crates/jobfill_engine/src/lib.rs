//! Jobfill engine: page model, field extraction and filling, request
//! orchestration and the execution contexts that host them.
mod background;
mod backend;
mod dom;
mod extract;
mod fill;
mod keepalive;
mod label;
mod messages;
mod orchestrator;
mod page_agent;
mod persist;
mod record;
mod select;
mod store;
mod text;
mod types;

pub use background::BackgroundController;
pub use backend::{
    decode_response, Backend, BackendSettings, GistAnswers, GistRequest, RequestData,
    RequestPayload, ReqwestBackend, ScoreRequest, ScoreResult, DEFAULT_BACKEND_URL,
};
pub use dom::{
    choice_group, control_kind, is_visible, select_options, AttachedFile, ControlSnapshot,
    DomError, DomEvent, Page, SelectOption,
};
pub use extract::{FieldExtractor, VisibleFieldExtractor};
pub use fill::{fill_fields, resolve_element, FillReport, SkipReason, SkippedField};
pub use keepalive::{KeepAlive, DEFAULT_KEEPALIVE_INTERVAL};
pub use label::{choice_caption, resolve_group_label, resolve_label};
pub use messages::{
    AgentMessage, AgentReply, BusError, ContextHandle, ContextTarget, Envelope, MessageRouter,
    PageReport,
};
pub use orchestrator::{
    OrchestratorSettings, RequestNotice, RequestOrchestrator, StatusReply, Submitted,
    REQUEST_TIMEOUT,
};
pub use page_agent::{is_supported, PageAgent};
pub use persist::{ensure_state_dir, AtomicFileWriter, DirLock, PersistError};
pub use record::{
    FailureKind, RequestContext, RequestFailure, RequestId, RequestKind, RequestRecord,
    RequestStatus, TransitionError,
};
pub use select::match_option;
pub use store::{
    request_key, FileStore, KeyValueStore, LastScore, MemoryStore, StateStore, StoreError,
    HEARTBEAT_KEY, LAST_SCORE_KEY, LAST_SCORE_URL_KEY, PARSED_RESUME_KEY, REQUEST_KEY_PREFIX,
    RESUME_FILE_KEY,
};
pub use types::{
    AnswerSet, FieldDescriptor, FieldLabel, FieldTag, ParsedResume, ResumeFilePayload, NO_LABEL,
};
