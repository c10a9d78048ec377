mod collaborators;
mod queue_store;
mod request_handler;

pub use collaborators::{
    GuildDirectory, InteractionClient, TicketRef, TicketRepository, TranscriptArchive,
};
pub use queue_store::QueueStore;
pub use request_handler::{CompletionNotifier, RequestHandler, StatusLog};
