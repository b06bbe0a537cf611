pub mod events;
pub mod ids;

pub use events::{EventType, MovieEvent};
pub use ids::{ImdbId, RatingKey, TaskId};
