//! Common types shared between `emotion_server` and `emotion_cam`.
pub mod protocol;
