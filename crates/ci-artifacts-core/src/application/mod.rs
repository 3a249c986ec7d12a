pub mod fetcher;
pub mod matcher;
pub mod poller;
pub mod resources;
pub mod workflow;

pub use fetcher::{
    download,
    DownloadOptions,
};
pub use matcher::{
    find_match,
    find_match_in,
};
pub use poller::{
    await_completion,
    trigger,
    CtrlCPrompt,
    InterruptHandler,
    NoInterrupt,
    PollSettings,
};
pub use resources::{
    change_reservations,
    list_resources,
    ReservationAction,
    ReservationOptions,
};
pub use workflow::{
    BuildWorkflow,
    DownloadTarget,
    JobRequest,
    OnMissing,
    Resolution,
};
