mod settings;

use std::env;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    BrokerSettings, ClientSettings, FlowSettings, LoggingSettings, Settings, SubscriberSettings,
};

/// Loads the configuration from the default file and environment variables.
///
/// Sources, lowest precedence first:
/// - `config/default.*` (optional)
/// - `PUBSUB_<SECTION>__<KEY>` environment variables (a `.env` file is read first)
/// - `PUBSUB_PROJECT_ID` and `GOOGLE_APPLICATION_CREDENTIALS`
///
/// Whatever is missing falls back to `Settings::default()`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("PUBSUB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("client.project", env::var("PUBSUB_PROJECT_ID").ok())?
        .set_override_option(
            "client.credentials",
            env::var("GOOGLE_APPLICATION_CREDENTIALS").ok(),
        )?;

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge())
}

#[cfg(test)]
mod tests;
