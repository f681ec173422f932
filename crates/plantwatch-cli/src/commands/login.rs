//! `plantwatch login` / `plantwatch logout`: manage the stored token.

use plantwatch_core::{HttpPlantApi, PlantConfig, TokenStore};

/// Run the login command.
pub fn run(config: &PlantConfig, email: &str, password: &str) {
    let api = HttpPlantApi::new(config.base_url.clone(), None);
    let rt = super::runtime();

    let token = match rt.block_on(api.login(email, password)) {
        Ok(token) => token,
        Err(e) => {
            eprintln!("Error: login failed: {e}");
            std::process::exit(1);
        }
    };

    let store = TokenStore::new(config.token_path());
    if let Err(e) = store.save(&token) {
        eprintln!("Error saving token to {}: {e}", store.path().display());
        std::process::exit(1);
    }
    println!("Logged in as {email}");
    println!("  Token saved to {}", store.path().display());
}

/// Run the logout command.
pub fn logout(config: &PlantConfig) {
    let store = TokenStore::new(config.token_path());
    if let Err(e) = store.clear() {
        eprintln!("Error removing {}: {e}", store.path().display());
        std::process::exit(1);
    }
    println!("Logged out");
}
