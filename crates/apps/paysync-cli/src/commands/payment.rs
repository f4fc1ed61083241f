//! Pending payment commands.

use paysync_ops::{CreatePaymentRequest, VerifyPaymentRequest};
use paysync_types::Amount;

use crate::config::CliConfig;
use crate::context::{parse_address, AppContext};
use crate::error::CliResult;
use crate::output::{OutputFormat, PaymentOutput, Render, VerifyOutput};

/// Create a pending payment, issuing a nonce when none is given.
pub fn create(
    config: CliConfig,
    format: OutputFormat,
    address: &str,
    amount: Amount,
    nonce: Option<String>,
) -> CliResult<String> {
    let ctx = AppContext::local(config)?;
    let address = parse_address(address)?;
    let nonce = match nonce {
        Some(nonce) => nonce,
        None => ctx.service.issue_nonce(&address).to_string(),
    };

    let payment = ctx
        .service
        .create_pending_payment(&address, &CreatePaymentRequest { nonce, amount })?;
    Ok(PaymentOutput {
        pending_payment: Some(payment),
    }
    .render(format))
}

/// Show a payment by id, or the address's open payment.
pub fn show(
    config: CliConfig,
    format: OutputFormat,
    address: &str,
    id: Option<&str>,
) -> CliResult<String> {
    let ctx = AppContext::local(config)?;
    let address = parse_address(address)?;
    let pending_payment = match id {
        Some(id) => Some(ctx.service.get_payment(&address, id)?),
        None => ctx.service.get_pending_payment(&address)?,
    };
    Ok(PaymentOutput { pending_payment }.render(format))
}

/// Record the client's signature and optional digest hint.
pub fn sign(
    config: CliConfig,
    format: OutputFormat,
    address: &str,
    id: &str,
    tx: Option<&str>,
) -> CliResult<String> {
    let ctx = AppContext::local(config)?;
    let address = parse_address(address)?;
    let payment = ctx.service.mark_signed(&address, id, tx)?;
    Ok(PaymentOutput {
        pending_payment: Some(payment),
    }
    .render(format))
}

/// Verify a transaction against a payment.
///
/// Uses the chain source when a contract is configured; otherwise the
/// payment is reported as awaiting the ingester.
pub async fn verify(
    config: CliConfig,
    format: OutputFormat,
    address: &str,
    id: &str,
    tx: &str,
) -> CliResult<String> {
    let ctx = if config.has_chain() {
        AppContext::with_chain(config)?
    } else {
        AppContext::local(config)?
    };
    let address = parse_address(address)?;
    let request = VerifyPaymentRequest {
        tx_digest: tx.to_string(),
        pending_payment_id: id.to_string(),
    };
    let response = ctx
        .service
        .verify_payment_transaction(&address, &request)
        .await?;
    Ok(VerifyOutput { response }.render(format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_address;
    use crate::error::CliError;
    use tempfile::TempDir;

    fn setup_config(temp_dir: &TempDir) -> CliConfig {
        let mut config = CliConfig::default();
        config.storage.base_dir = temp_dir.path().to_path_buf();
        config
    }

    fn payment_id(json: &str) -> String {
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        value["pendingPayment"]["id"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_create_and_show() {
        let temp_dir = TempDir::new().unwrap();
        let config = setup_config(&temp_dir);
        let address = test_address(1);

        let created = create(
            config.clone(),
            OutputFormat::Json,
            &address,
            1000,
            Some("order-17".to_string()),
        )
        .unwrap();
        assert!(created.contains("\"nonce\": \"order-17\""));
        let id = payment_id(&created);

        let open = show(config.clone(), OutputFormat::Json, &address, None).unwrap();
        assert_eq!(payment_id(&open), id);

        let by_id = show(config, OutputFormat::Human, &address, Some(&id)).unwrap();
        assert!(by_id.contains("order-17"));
    }

    #[test]
    fn test_second_open_payment_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config = setup_config(&temp_dir);
        let address = test_address(2);

        create(config.clone(), OutputFormat::Json, &address, 1000, None).unwrap();
        let err = create(config, OutputFormat::Json, &address, 500, None).unwrap_err();
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn test_show_other_address_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let config = setup_config(&temp_dir);

        let created = create(config.clone(), OutputFormat::Json, &test_address(3), 1000, None)
            .unwrap();
        let id = payment_id(&created);

        let err = show(config, OutputFormat::Json, &test_address(4), Some(&id)).unwrap_err();
        assert!(matches!(err, CliError::Ops(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_sign_records_hint() {
        let temp_dir = TempDir::new().unwrap();
        let config = setup_config(&temp_dir);
        let address = test_address(5);
        let digest = format!("0x{}", "ab".repeat(32));

        let created = create(config.clone(), OutputFormat::Json, &address, 1000, None).unwrap();
        let id = payment_id(&created);

        let signed = sign(config, OutputFormat::Json, &address, &id, Some(&digest)).unwrap();
        assert!(signed.contains("\"status\": \"signed\""));
        assert!(signed.contains(&digest));
    }

    #[tokio::test]
    async fn test_verify_without_chain_awaits() {
        let temp_dir = TempDir::new().unwrap();
        let config = setup_config(&temp_dir);
        let address = test_address(6);
        let digest = format!("0x{}", "cd".repeat(32));

        let created = create(config.clone(), OutputFormat::Json, &address, 1000, None).unwrap();
        let id = payment_id(&created);

        let output = verify(config, OutputFormat::Json, &address, &id, &digest)
            .await
            .unwrap();
        assert!(output.contains("\"status\": \"awaitingChain\""));
        assert!(output.contains("\"pointsAdded\": 0"));
    }
}
