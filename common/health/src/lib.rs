use std::collections::HashMap;
use std::ops::Add;
use std::sync::{Arc, RwLock};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

/// Liveness reporting for the long-running pieces of a service.
///
/// A background loop registers itself with a reporting deadline and calls
/// [`HealthHandle::report_healthy`] on every iteration. The registry answers
/// the process liveness probe: healthy only while every registered component
/// has reported within its deadline and none has flagged itself unhealthy.
///
/// Liveness and readiness are deliberately kept apart; a probe should get its
/// own registry instance rather than answering both from one state.

#[derive(Default, Debug)]
pub struct HealthStatus {
    /// The overall status: true if all components are healthy
    pub healthy: bool,
    /// Current status of each registered component, for display
    pub components: HashMap<String, ComponentStatus>,
}

impl IntoResponse for HealthStatus {
    /// Computes the axum status code based on the overall health status,
    /// and prints each component status in the body for debugging.
    fn into_response(self) -> Response {
        let body = format!("{self:?}");
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Automatically set when a component is newly registered
    Starting,
    /// Recently reported healthy, will need to report again before the date
    HealthyUntil(OffsetDateTime),
    /// Reported unhealthy
    Unhealthy,
    /// Automatically set when the HealthyUntil deadline is reached
    Stalled,
}

type ComponentMap = Arc<RwLock<HashMap<String, ComponentStatus>>>;

/// Held by a component, used to report its status to the registry it was
/// registered in.
#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    deadline: Duration,
    components: ComponentMap,
}

impl HealthHandle {
    /// Report as healthy. Must be called again before the deadline elapses,
    /// or the component is considered stalled.
    pub fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            OffsetDateTime::now_utc().add(self.deadline),
        ))
    }

    pub fn report_status(&self, status: ComponentStatus) {
        match self.components.write() {
            Ok(mut components) => {
                _ = components.insert(self.component.clone(), status);
            }
            // Poisoned lock: just warn, the probes will fail and the process restart
            Err(_) => warn!("poisoned health registry lock"),
        }
    }
}

#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    components: ComponentMap,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            components: Default::default(),
        }
    }

    /// Registers a new component. The returned handle should be passed to the
    /// component, to allow it to frequently report its health status.
    pub fn register(&self, component: &str, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component: component.to_owned(),
            deadline,
            components: self.components.clone(),
        };
        handle.report_status(ComponentStatus::Starting);
        handle
    }

    /// Returns the overall process status, computed from the status of all the
    /// components currently registered. Can be used as an axum handler.
    pub fn get_status(&self) -> HealthStatus {
        let components = match self.components.read() {
            Ok(components) => components,
            Err(_) => {
                warn!("poisoned health registry lock");
                return HealthStatus::default();
            }
        };

        // Unhealthy until at least one component has registered
        let mut status = HealthStatus {
            healthy: !components.is_empty(),
            components: HashMap::with_capacity(components.len()),
        };
        let now = OffsetDateTime::now_utc();

        for (name, component) in components.iter() {
            let reported = match component {
                ComponentStatus::HealthyUntil(until) if until.gt(&now) => component.clone(),
                ComponentStatus::HealthyUntil(_) => {
                    status.healthy = false;
                    ComponentStatus::Stalled
                }
                other => {
                    status.healthy = false;
                    other.clone()
                }
            };
            _ = status.components.insert(name.clone(), reported);
        }

        match status.healthy {
            true => info!("{} health check ok", self.name),
            false => warn!("{} health check failed: {:?}", self.name, status.components),
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use crate::{ComponentStatus, HealthRegistry, HealthStatus};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::ops::Sub;
    use time::{Duration, OffsetDateTime};

    #[test]
    fn defaults_to_unhealthy() {
        let registry = HealthRegistry::new("liveness");
        assert!(!registry.get_status().healthy);
    }

    #[test]
    fn one_component() {
        let registry = HealthRegistry::new("liveness");

        // New components are registered in Starting
        let handle = registry.register("one", Duration::seconds(30));
        let mut status = registry.get_status();
        assert!(!status.healthy);
        assert_eq!(
            status.components.get("one"),
            Some(&ComponentStatus::Starting)
        );

        // Status goes healthy once the component reports
        handle.report_healthy();
        status = registry.get_status();
        assert!(status.healthy);
        assert_eq!(status.components.len(), 1);

        // Status goes unhealthy if the component says so
        handle.report_status(ComponentStatus::Unhealthy);
        status = registry.get_status();
        assert!(!status.healthy);
        assert_eq!(
            status.components.get("one"),
            Some(&ComponentStatus::Unhealthy)
        );
    }

    #[test]
    fn staleness_check() {
        let registry = HealthRegistry::new("liveness");
        let handle = registry.register("one", Duration::seconds(30));

        handle.report_healthy();
        assert!(registry.get_status().healthy);

        // If the component's ping is too old, it is considered stalled and the healthcheck fails
        handle.report_status(ComponentStatus::HealthyUntil(
            OffsetDateTime::now_utc().sub(Duration::seconds(1)),
        ));
        let status = registry.get_status();
        assert!(!status.healthy);
        assert_eq!(
            status.components.get("one"),
            Some(&ComponentStatus::Stalled)
        );
    }

    #[test]
    fn several_components() {
        let registry = HealthRegistry::new("liveness");
        let handle1 = registry.register("one", Duration::seconds(30));
        let handle2 = registry.register("two", Duration::seconds(30));
        assert_eq!(registry.get_status().components.len(), 2);

        // First component going healthy is not enough
        handle1.report_healthy();
        assert!(!registry.get_status().healthy);

        // Second component going healthy brings the health to green
        handle2.report_healthy();
        assert!(registry.get_status().healthy);

        // Either component going unhealthy takes down the health to red
        handle1.report_status(ComponentStatus::Unhealthy);
        assert!(!registry.get_status().healthy);

        // First component recovering returns the health to green
        handle1.report_healthy();
        assert!(registry.get_status().healthy);

        handle2.report_status(ComponentStatus::Unhealthy);
        assert!(!registry.get_status().healthy);
    }

    #[test]
    fn into_response() {
        let nok = HealthStatus::default().into_response();
        assert_eq!(nok.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let ok = HealthStatus {
            healthy: true,
            components: Default::default(),
        }
        .into_response();
        assert_eq!(ok.status(), StatusCode::OK);
    }
}
