//! Service context for CLI operations.

use std::sync::Arc;

use paysync_chain::{ChainSource, NeoRpcSource, RetryPolicy};
use paysync_econ::PointsConverter;
use paysync_ops::{
    IngestConfig, PaymentMatcher, PaymentService, TimeoutSweep, TransactionIngester,
};
use paysync_store::PaysyncState;
use paysync_types::{Address, StreamId};

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

/// Opened storage plus the services built on it.
pub struct AppContext {
    /// Storage.
    pub state: PaysyncState,
    /// Request surface.
    pub service: PaymentService,
    /// Chain source, when a payment contract is configured.
    pub chain: Option<Arc<dyn ChainSource>>,
    /// Configuration.
    pub config: CliConfig,
}

impl AppContext {
    /// Open storage without chain access.
    ///
    /// Use this for commands that only read or write the database.
    pub fn local(config: CliConfig) -> CliResult<Self> {
        let state = PaysyncState::open(config.state_config())?;
        let converter = PointsConverter::new(config.pricing)?;
        let service = PaymentService::new(state.clone(), converter);
        Ok(Self {
            state,
            service,
            chain: None,
            config,
        })
    }

    /// Open storage and connect the Neo RPC source.
    ///
    /// Fails if no payment contract is configured.
    pub fn with_chain(config: CliConfig) -> CliResult<Self> {
        if !config.has_chain() {
            return Err(CliError::config(
                "no payment contract configured; set [chain].payment_contract",
            ));
        }
        let state = PaysyncState::open(config.state_config())?;
        let converter = PointsConverter::new(config.pricing)?;
        let retry = RetryPolicy::from_config(&config.retry);
        let chain: Arc<dyn ChainSource> =
            Arc::new(NeoRpcSource::new(config.chain.clone(), retry)?);
        let service = PaymentService::with_chain(state.clone(), converter, Arc::clone(&chain));
        Ok(Self {
            state,
            service,
            chain: Some(chain),
            config,
        })
    }

    /// Stream from the argument, or the configured default.
    pub fn stream(&self, arg: Option<&str>) -> CliResult<StreamId> {
        match arg {
            Some(s) => Ok(StreamId::parse(s)?),
            None => Ok(self.config.ingest.stream_id.clone()),
        }
    }

    /// Ingest configuration with an optional stream override.
    pub fn ingest_config(&self, stream: Option<&str>) -> CliResult<IngestConfig> {
        let config = self.config.ingest.clone().with_stream(self.stream(stream)?);
        config.validate()?;
        Ok(config)
    }

    /// Build the ingester for `config`.
    pub fn ingester(&self, config: IngestConfig) -> CliResult<TransactionIngester> {
        let chain = self.chain.clone().ok_or_else(|| {
            CliError::config("no payment contract configured; set [chain].payment_contract")
        })?;
        let matcher = PaymentMatcher::new(self.state.clone(), *self.service.converter());
        Ok(TransactionIngester::new(
            self.state.clone(),
            chain,
            matcher,
            config,
            RetryPolicy::from_config(&self.config.retry),
        ))
    }

    /// Build the timeout sweep.
    pub fn sweep(&self) -> TimeoutSweep {
        let ingest = &self.config.ingest;
        TimeoutSweep::new(
            self.state.clone(),
            ingest.payment_expiry,
            ingest.sweep_interval,
        )
        .with_batch_limit(ingest.sweep_batch_limit)
    }
}

/// Parse an address argument.
pub fn parse_address(s: &str) -> CliResult<Address> {
    Ok(Address::parse(s)?)
}
