use clap::Parser;
use session_gate::cli::{Cli, Commands, FetchArgs, InitArgs, LoginArgs, NavigateArgs};
use session_gate::config::{Config, config_file_path, load_config, save_config};
use session_gate::guard::GuardView;
use session_gate::logger::setup_logging;
use session_gate::navigation::{Navigator, Route};
use session_gate::{App, AppError, LoginCredentials, LoginError};
use std::path::PathBuf;
use std::time::Duration;

// How long `fetch` waits for the interceptor to finish a forced logout
const INTERCEPTOR_WAIT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    if let Commands::Init(args) = &cli.command {
        let path = cli.config.clone().unwrap_or_else(config_file_path);
        return init(path, args);
    }

    let mut config = load_config(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {}", e);
        std::process::exit(1);
    });
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    // Keep the guard alive to ensure log messages are flushed
    let _guard = setup_logging(&config, cli.log_file).unwrap_or_else(|e| {
        eprintln!("Failed to set up logging: {}", e);
        None
    });

    let app = App::start(&config).await?;

    match cli.command {
        Commands::Init(_) => Ok(()),
        Commands::Login(args) => login(&app, args).await,
        Commands::Logout => {
            app.logout().await?;
            println!("Logged out.");
            Ok(())
        }
        Commands::Status => status(&app).await,
        Commands::Navigate(args) => navigate(&app, args).await,
        Commands::Fetch(args) => fetch(&app, args).await,
    }
}

fn init(path: PathBuf, args: &InitArgs) -> Result<(), AppError> {
    if path.exists() && !args.force {
        eprintln!(
            "Configuration file already exists at {} (use --force to overwrite)",
            path.display()
        );
        std::process::exit(1);
    }

    save_config(&Config::default(), &path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn login(app: &App, args: LoginArgs) -> Result<(), AppError> {
    let password = match args.password {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ").map_err(|e| AppError::Generic {
            message: format!("Failed to read password: {}", e),
        })?,
    };
    let credentials = LoginCredentials::new(args.email, password);

    match app.login.submit(&credentials).await {
        Ok(()) => {
            println!("Logged in. Now at {}", app.current_pathname());
            Ok(())
        }
        Err(LoginError::Validation(errors)) => {
            for (field, message) in errors.iter() {
                eprintln!("{}: {}", field, message);
            }
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

async fn status(app: &App) -> Result<(), AppError> {
    let logged_in = app.session.check().await?;
    println!("Logged in: {}", logged_in);
    println!("Initial route: {}", app.initial_route.route().pathname());

    if logged_in {
        println!("Auto reference: {}", app.session.is_auto_reference().await?);
        if let Some(profile) = app.session.user_profile().await? {
            let rendered = serde_json::to_string_pretty(&profile).map_err(|e| AppError::Generic {
                message: format!("Failed to render profile: {}", e),
            })?;
            println!("User: {}", rendered);
        }
    }
    Ok(())
}

async fn navigate(app: &App, args: NavigateArgs) -> Result<(), AppError> {
    let state = app.navigate(&Route::parse(&args.route)).await;

    println!("Route: {}", app.current_pathname());
    match state.view() {
        GuardView::Loading => println!("Loading..."),
        GuardView::ErrorMessage(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
        GuardView::Content => println!("Access: {:?}", state),
    }
    Ok(())
}

async fn fetch(app: &App, args: FetchArgs) -> Result<(), AppError> {
    match app.api.get_json::<serde_json::Value>(&args.path).await {
        Ok(body) => {
            let rendered = serde_json::to_string_pretty(&body).map_err(|e| AppError::Generic {
                message: format!("Failed to render response: {}", e),
            })?;
            println!("{}", rendered);
            Ok(())
        }
        Err(e) if e.is_authentication_failure() => {
            let mut segments = app.navigator.subscribe();
            let landed = tokio::time::timeout(
                INTERCEPTOR_WAIT,
                segments.wait_for(|s| Route::from_segments(s.clone()).is_public_entry()),
            )
            .await
            .is_ok();
            if !landed {
                tracing::warn!("Interceptor did not redirect within {:?}", INTERCEPTOR_WAIT);
            }
            eprintln!("Session is no longer valid: {}", e);
            println!("Route: {}", app.current_pathname());
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
