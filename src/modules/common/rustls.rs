use crate::{
    modules::{
        error::{code::ErrorCode, NuboResult},
        Initialize,
    },
    raise_error,
};

pub struct NuboTls;

impl Initialize for NuboTls {
    async fn initialize() -> NuboResult<()> {
        rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
            .map_err(|_| {
                raise_error!(
                    "failed to set crypto provider".into(),
                    ErrorCode::InternalError
                )
            })
    }
}
