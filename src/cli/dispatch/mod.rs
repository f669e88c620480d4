use crate::cli::actions::{server, Action};
use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use secrecy::SecretString;

/// Turn parsed command-line matches into an action.
///
/// # Errors
/// Returns an error when required arguments are missing or the SMTP
/// options are incomplete.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let required_string = |name: &str| -> Result<String> {
        matches
            .get_one::<String>(name)
            .map(ToString::to_string)
            .context(format!("missing required argument: {name}"))
    };

    let smtp = match matches.get_one::<String>("smtp-host") {
        Some(host) => {
            let from = matches
                .get_one::<String>("smtp-from")
                .ok_or_else(|| anyhow!("--smtp-from is required when --smtp-host is set"))?;

            Some(server::SmtpArgs {
                host: host.to_string(),
                port: *matches
                    .get_one::<u16>("smtp-port")
                    .unwrap_or(&587),
                username: matches.get_one::<String>("smtp-username").cloned(),
                password: matches
                    .get_one::<String>("smtp-password")
                    .map(|p| SecretString::from(p.to_string())),
                from: from.to_string(),
            })
        }
        None => None,
    };

    let args = server::Args {
        port: *matches
            .get_one::<u16>("port")
            .context("missing required argument: port")?,
        dsn: required_string("dsn")?,
        provider_url: required_string("provider-url")?,
        provider_api_key: SecretString::from(required_string("provider-api-key")?),
        frontend_base_url: required_string("frontend-base-url")?,
        cleanup_secret: SecretString::from(required_string("cleanup-secret")?),
        verification_token_ttl: *matches
            .get_one::<i64>("verification-token-ttl")
            .context("missing required argument: verification-token-ttl")?,
        reset_token_ttl: *matches
            .get_one::<i64>("reset-token-ttl")
            .context("missing required argument: reset-token-ttl")?,
        session_ttl: *matches
            .get_one::<i64>("session-ttl")
            .context("missing required argument: session-ttl")?,
        resend_cooldown: *matches
            .get_one::<i64>("resend-cooldown")
            .context("missing required argument: resend-cooldown")?,
        smtp,
    };

    Ok(Action::Server(Box::new(args)))
}
