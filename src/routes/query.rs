use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SongsQuery {
    pub limit: Option<usize>,
}
