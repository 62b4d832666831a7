pub mod agent;
pub mod profile;
pub mod recommendation;
pub mod song;

pub use agent::{
    AudioFeaturePreference, GenrePreference, ListeningBehavior, MusicAgent, Playlist, PlaylistKind,
};
pub use profile::{
    Interaction, InteractionKind, ProfileSummary, RatedSong, RatingStats, UserProfile,
    LIKE_THRESHOLD,
};
pub use recommendation::{RecommendationEntry, RecommendationResult, RecommendationSource};
pub use song::{parse_release_year, AudioFeatures, Song, AUDIO_FEATURES};
