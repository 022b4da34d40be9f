//! vernon-pipeline: answers one utterance at a time.
//!
//! Validation → Logging → Busy-state middleware wrap an ordered list of processors
//! (Booking, Agent/Event, Location/Search, AI fallback). Search-backed processors go
//! through the [`SearchResolver`] strategies; every accepted utterance ends with exactly
//! one assistant message.

pub mod context;
pub mod extract;
pub mod middleware;
pub mod pagination;
pub mod pipeline;
pub mod processors;
pub mod providers;
pub mod resolver;
pub mod result;
pub mod vocabulary;

pub use context::{PipelineContext, ReplyHandle};
pub use extract::{BookingExtractor, DEFAULT_PARTY_SIZE};
pub use middleware::{BusyGate, Middleware, Next, BUSY_REPLY};
pub use pagination::{
    DirectiveParser, PageAction, PageDirective, PaginationState, SharedPagination,
    DEFAULT_CATEGORY,
};
pub use pipeline::MessagePipeline;
pub use processors::{default_routes, ProcessorKind, Route, Services, BOOKING_PLACEHOLDER};
pub use providers::{
    build_generators, build_search_providers, ChatCompletionsGenerator, ChatSearchProvider,
    MockGenerator,
};
pub use resolver::{Resolution, SearchResolver, Strategy};
pub use result::ProcessingResult;
