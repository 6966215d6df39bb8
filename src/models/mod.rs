// Model exports
pub mod domain;
pub mod notification;
pub mod requests;
pub mod responses;

pub use domain::{
    Contact, Coordinates, InputError, JobContext, JobId, ListingFilter, MatchCandidate, Page,
    PayType, RankedPosting, ScoreBreakdown, SkillId, SortMode, UserType, WorkerContext, WorkerId,
};
pub use notification::{
    DeliveryMethod, DeliveryStatus, InvalidTransition, Notification, NotificationType, NotifyRequest,
};
pub use requests::{
    ListJobsQuery, ListNotificationsQuery, MarkReadRequest, MatchesQuery, ProviderStatusRequest, UserResponse,
    VoiceAction,
};
pub use responses::{
    ErrorResponse, FanOutResponse, HealthResponse, ListJobsResponse, MatchesResponse,
    NotificationsResponse, Pagination,
};
