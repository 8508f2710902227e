//! Both test clients for one application

use wicket::App;
use crate::{client::TestClient, in_process::InProcessClient};

/// Holds a real-socket and an in-process client for the same [`App`]
#[derive(Debug)]
pub struct TestManager {
    test_client: TestClient,
    in_process: InProcessClient,
}

impl TestManager {
    /// Creates both clients with their default settings
    pub fn new(app: &App) -> Self {
        Self {
            test_client: TestClient::new(app.clone()),
            in_process: InProcessClient::new(app.clone()),
        }
    }

    /// Returns the real-socket client
    #[inline]
    pub fn test_client(&self) -> &TestClient {
        &self.test_client
    }

    /// Returns the in-process client
    #[inline]
    pub fn in_process(&self) -> &InProcessClient {
        &self.in_process
    }
}

/// Test client constructors on [`App`]
pub trait AppTestExt {
    /// Creates a real-socket [`TestClient`] for the app
    fn test_client(&self) -> TestClient;

    /// Creates an [`InProcessClient`] for the app
    fn in_process_client(&self) -> InProcessClient;

    /// Creates a [`TestManager`] for the app
    fn test_manager(&self) -> TestManager;
}

impl AppTestExt for App {
    #[inline]
    fn test_client(&self) -> TestClient {
        TestClient::new(self.clone())
    }

    #[inline]
    fn in_process_client(&self) -> InProcessClient {
        InProcessClient::new(self.clone())
    }

    #[inline]
    fn test_manager(&self) -> TestManager {
        TestManager::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_builds_default_clients() {
        let app = App::new();

        let manager = app.test_manager();

        assert_eq!(manager.test_client().host(), "127.0.0.1");
        assert_eq!(manager.test_client().port(), None);
        assert_eq!(manager.in_process().base_url(), "http://mockserver:1234");
    }
}
