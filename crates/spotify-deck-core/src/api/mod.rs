mod client;

pub use client::{
    AlbumSummary, ApiError, ApiResult, ArtistSummary, SpotifyApiClient, TrackSummary, UserProfile,
};
