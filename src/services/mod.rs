// Services module - clients for the external media server

pub mod jellyfin;
