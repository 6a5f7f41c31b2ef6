//! Core library for the Spotify session plumbing shared by front-ends:
//! PKCE authorization, token lifecycle, session state, and Web API calls.

pub mod api;
pub mod auth;
pub mod config;
pub mod services;
pub mod session;
