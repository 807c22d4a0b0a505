//! Maps an issued credential into environment variables for one downstream
//! process. The mapping lives in memory only and is wiped on drop; nothing
//! here ever touches the filesystem.

use crate::constants;
use crate::error::BrokerError;
use crate::models::credential::Credential;
use secrecy::ExposeSecret;
use zeroize::Zeroizing;

/// Environment entries to layer onto the child's inherited environment.
#[derive(Debug)]
pub struct InjectedEnv {
    vars: Vec<(String, Zeroizing<String>)>,
}

impl InjectedEnv {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Build the augmented environment for the downstream process.
///
/// Caller-supplied overrides are layered first; they may not collide with the
/// credential variables, since silently clobbering an issued key would run
/// the command with a credential nobody leased.
pub fn inject(
    credential: &Credential,
    region: Option<&str>,
    overrides: &[(String, String)],
) -> Result<InjectedEnv, BrokerError> {
    let reserved = [
        constants::VAR_ACCESS_KEY_ID,
        constants::VAR_SECRET_ACCESS_KEY,
        constants::VAR_SESSION_TOKEN,
    ];
    if let Some((key, _)) = overrides.iter().find(|(k, _)| reserved.contains(&k.as_str())) {
        return Err(BrokerError::Config {
            reason: format!("environment override '{}' collides with an injected credential variable", key),
        });
    }

    let mut vars: Vec<(String, Zeroizing<String>)> = overrides
        .iter()
        .map(|(k, v)| (k.clone(), Zeroizing::new(v.clone())))
        .collect();

    vars.push((
        constants::VAR_ACCESS_KEY_ID.to_string(),
        Zeroizing::new(credential.access_key_id.clone()),
    ));
    vars.push((
        constants::VAR_SECRET_ACCESS_KEY.to_string(),
        Zeroizing::new(credential.secret_key.expose_secret().to_string()),
    ));
    if let Some(token) = &credential.session_token {
        vars.push((
            constants::VAR_SESSION_TOKEN.to_string(),
            Zeroizing::new(token.expose_secret().to_string()),
        ));
    }
    if let Some(region) = region {
        vars.push((
            constants::VAR_DEFAULT_REGION.to_string(),
            Zeroizing::new(region.to_string()),
        ));
        vars.push((
            constants::VAR_REGION.to_string(),
            Zeroizing::new(region.to_string()),
        ));
    }

    Ok(InjectedEnv { vars })
}
