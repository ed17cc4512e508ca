#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ServerError {
    #[error("connection to target address is prohibited by firewall rules")]
    PolicyDenied,
    #[error("no connection record for session")]
    SessionNotFound,
}
