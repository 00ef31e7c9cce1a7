//! Automation-hiding scripts installed on every new document.
//!
//! Each script is an IIFE so nothing leaks into the page's global scope.

pub const STEALTH_SCRIPTS: &[&str] = &[
    // navigator.webdriver reads as undefined
    r#"(() => {
        Object.defineProperty(Navigator.prototype, 'webdriver', {
            get: () => undefined,
            configurable: true
        });
    })();"#,
    // notifications permission mirrors Notification.permission
    r#"(() => {
        const permissions = window.navigator.permissions;
        if (!permissions || !permissions.query) return;
        const query = permissions.query.bind(permissions);
        permissions.query = (parameters) => (
            parameters && parameters.name === 'notifications'
                ? Promise.resolve({ state: Notification.permission })
                : query(parameters)
        );
    })();"#,
    // headless Chrome ships without window.chrome
    r#"(() => {
        if (!window.chrome) {
            window.chrome = { runtime: {}, app: {}, csi: () => {}, loadTimes: () => {} };
        }
    })();"#,
    // match the Accept-Language the HTTP tier sends
    r#"(() => {
        Object.defineProperty(Navigator.prototype, 'languages', {
            get: () => ['en-GB', 'en'],
            configurable: true
        });
    })();"#,
    // an empty plugin list is a headless tell
    r#"(() => {
        Object.defineProperty(Navigator.prototype, 'plugins', {
            get: () => [
                { name: 'PDF Viewer', filename: 'internal-pdf-viewer' },
                { name: 'Chrome PDF Viewer', filename: 'internal-pdf-viewer' }
            ],
            configurable: true
        });
    })();"#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_cover_required_patches() {
        let all = STEALTH_SCRIPTS.join("\n");
        assert!(all.contains("'webdriver'"));
        assert!(all.contains("'notifications'"));
        assert!(all.contains("Notification.permission"));
    }

    #[test]
    fn test_scripts_are_scoped() {
        for script in STEALTH_SCRIPTS {
            assert!(script.starts_with("(() => {"));
            assert!(script.ends_with("})();"));
        }
    }
}
