//! Configuration loading with layered precedence.
//!
//! Layers, lowest to highest: application defaults, configuration file,
//! environment variables, command-line arguments.
//!
//! Layers are composed by hand with `MergeComposer` instead of the derived
//! `load()` because the `Cli` owns subcommand dispatch and because Figment's
//! environment layer silently drops unparseable values. Typed variables such
//! as `PODLINK_ALTERNATE_ENABLED=maybe` fail loading with a clear error here.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

#[derive(Clone, Copy)]
enum EnvVarType {
    String,
    Bool,
    U32,
    U64,
}

struct EnvVarSpec {
    env_var: &'static str,
    path: &'static [&'static str],
    var_type: EnvVarType,
}

const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    EnvVarSpec {
        env_var: "PODLINK_DEFAULT_HOST",
        path: &["default_host"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "PODLINK_ALTERNATE_ENABLED",
        path: &["alternate", "enabled"],
        var_type: EnvVarType::Bool,
    },
    EnvVarSpec {
        env_var: "PODLINK_ALTERNATE_PROGRAM",
        path: &["alternate", "program"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "PODLINK_SERVICE_POLL_INTERVAL_MS",
        path: &["service", "poll_interval_ms"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "PODLINK_SERVICE_POLL_ATTEMPTS",
        path: &["service", "poll_attempts"],
        var_type: EnvVarType::U32,
    },
    EnvVarSpec {
        env_var: "PODLINK_SERVICE_STARTUP_TIMEOUT_SECS",
        path: &["service", "startup_timeout_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "PODLINK_SERVICE_SHUTDOWN_GRACE_MS",
        path: &["service", "shutdown_grace_ms"],
        var_type: EnvVarType::U64,
    },
];

/// Environment variable names recognised by the loader.
///
/// Tests use this to clear every `PODLINK_*` variable without a hard-coded
/// list.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path.parent().unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Load configuration from every layer, reading the process environment.
///
/// # Errors
///
/// Returns `ConfigError` when a configuration file is malformed, a typed
/// environment variable does not parse, the merge fails, or the merged
/// service timings are invalid.
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    load_config_with_env(cli, &mockable::DefaultEnv::new())
}

/// Load configuration from every layer, reading `PODLINK_*` values from
/// `env`.
///
/// File discovery through `PODLINK_CONFIG_PATH` is performed by
/// `ortho_config` against the process environment.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with_env<E: mockable::Env>(cli: &Cli, env: &E) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    let config_path: Option<Utf8PathBuf> =
        cli.config.clone().filter(|p| p.exists()).or_else(|| {
            let discovery = ConfigDiscovery::builder("podlink")
                .env_var("PODLINK_CONFIG_PATH")
                .config_file_name("config.toml")
                .dotfile_name(".podlink.toml")
                .build();
            discovery
                .candidates()
                .into_iter()
                .filter(|p| p.exists())
                .find_map(|p| Utf8PathBuf::try_from(p).ok())
        });

    if let Some(ref path) = config_path {
        load_config_file(path, &mut composer)?;
    }

    let env_values = collect_env_vars(env)?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.service.validate()?;

    Ok(config)
}

/// Collect `PODLINK_*` variables into a JSON value following
/// [`ENV_VAR_SPECS`].
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` for a typed variable that does not
/// parse.
fn collect_env_vars<E: mockable::Env>(env: &E) -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Some(raw_value) = env.string(spec.env_var) else {
            continue;
        };
        let json_value = parse_env_value(spec, raw_value)?;
        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

fn parse_env_value(spec: &EnvVarSpec, raw_value: String) -> Result<Value> {
    let invalid = |expected: &str, raw: &str| ConfigError::InvalidValue {
        field: spec.env_var.to_owned(),
        reason: format!("expected {expected}, got '{raw}'"),
    };

    let value = match spec.var_type {
        EnvVarType::String => Value::String(raw_value),
        EnvVarType::Bool => Value::Bool(
            raw_value
                .parse::<bool>()
                .map_err(|_| invalid("bool (true/false)", &raw_value))?,
        ),
        EnvVarType::U32 => Value::Number(
            raw_value
                .parse::<u32>()
                .map_err(|_| invalid("unsigned 32-bit integer", &raw_value))?
                .into(),
        ),
        EnvVarType::U64 => Value::Number(
            raw_value
                .parse::<u64>()
                .map_err(|_| invalid("unsigned integer", &raw_value))?
                .into(),
        ),
    };
    Ok(value)
}

/// Insert `value` at a nested `path`, creating intermediate objects.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(field.to_owned(), value);
}

fn build_cli_overrides(cli: &Cli) -> serde_json::Value {
    let mut overrides = serde_json::Map::new();

    if let Some(ref host) = cli.default_host {
        overrides.insert(
            "default_host".to_owned(),
            serde_json::Value::String(host.clone()),
        );
    }

    if overrides.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::Value::Object(overrides)
    }
}
