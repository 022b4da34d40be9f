//! vernon-core: conversation model, configuration, provider chain and the external
//! collaborator traits shared by the voice layer and the message pipeline.

pub mod booking;
pub mod collaborators;
pub mod conversation;
pub mod error;
pub mod provider_chain;
pub mod settings;
pub mod venues;

pub use booking::SimulatedBookings;
pub use collaborators::{
    BookingConfirmation, BookingKind, BookingRequest, BookingService, SearchOptions,
    SearchProvider, SearchResult, TextGenerator, Venue, VenueDirectory,
};
pub use settings::{
    BusyPolicy, EndpointConfig, LlmMode, PipelineConfig, ProvidersConfig, VernonConfig,
    VoiceSettings,
};
pub use conversation::{ConversationState, Origin, SharedConversation, Utterance};
pub use error::{VernonError, VernonResult};
pub use provider_chain::{min_chars, ChainSuccess, Named, ProviderChain};
pub use venues::StaticVenueDirectory;
