// Конфигурация сессии
// Логирование можно отключить только в режиме разработки

use crate::error::ConfigError;
use crate::peer::types::ServerConfig;
use serde::Deserialize;
use std::time::Duration;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // В режиме отладки логирование включено

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // В продакшене логирование отключено

#[cfg(debug_assertions)]
pub mod dev {
    // Для полного отключения логирования в режиме разработки
    // измените эту константу на false
    pub const ENABLE_LOGGING: bool = true;
}

#[cfg(not(debug_assertions))]
pub mod dev {
    pub const ENABLE_LOGGING: bool = false;
}

/// Период ожидания восстановления соединения после Disconnected/Failed
pub const GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Настройки одного звонка. Создаются на сессию, глобально не разделяются.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub ice_servers: Vec<ServerConfig>,
    pub video: bool,
    pub audio: bool,
    pub grace_period: Duration,
    /// Придерживать удалённых кандидатов, пришедших до remote description,
    /// и применять их после неё. Если выключено, кандидат сразу уходит в endpoint,
    /// а ошибки игнорируются.
    pub buffer_early_candidates: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            video: true,
            audio: true,
            grace_period: GRACE_PERIOD,
            buffer_early_candidates: true,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct ConfigDocument {
    ice_servers: Option<Vec<ServerConfig>>,
    video: bool,
    audio: bool,
    grace_period_secs: u64,
    buffer_early_candidates: bool,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            ice_servers: None,
            video: true,
            audio: true,
            grace_period_secs: GRACE_PERIOD.as_secs(),
            buffer_early_candidates: true,
        }
    }
}

impl SessionConfig {
    /// Заменяет список ICE-серверов после проверки
    pub fn with_ice_servers(mut self, servers: Vec<ServerConfig>) -> Result<Self, ConfigError> {
        validate_ice_servers(&servers)?;
        tracing::debug!("Using {} custom ICE servers", servers.len());
        self.ice_servers = servers;
        Ok(self)
    }

    pub fn from_json(doc: &str) -> Result<Self, ConfigError> {
        let doc: ConfigDocument =
            serde_json::from_str(doc).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let base = SessionConfig {
            video: doc.video,
            audio: doc.audio,
            grace_period: Duration::from_secs(doc.grace_period_secs),
            buffer_early_candidates: doc.buffer_early_candidates,
            ..Default::default()
        };
        match doc.ice_servers {
            Some(servers) => base.with_ice_servers(servers),
            None => Ok(base),
        }
    }
}

/// Валидация серверов: пустой URL запрещён, TURN требует username и credential
pub fn validate_ice_servers(servers: &[ServerConfig]) -> Result<(), ConfigError> {
    for server in servers {
        if server.url.is_empty() {
            return Err(ConfigError::EmptyUrl);
        }
        if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none()) {
            return Err(ConfigError::MissingTurnCredentials(server.url.clone()));
        }
    }
    Ok(())
}

/// Дефолтные ICE серверы в формате ServerConfig
pub fn default_ice_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig {
            id: "default-stun".into(),
            r#type: "stun".into(),
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
}
