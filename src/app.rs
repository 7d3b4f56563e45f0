use autopilot_browser::{
    login::CaptchaPrompt,
    session::WatchSession,
};
use autopilot_config::{
    Args,
    Config,
    Playlist,
};
use eyre::{
    Context as _,
    Result,
};
use std::{
    io::{
        self,
        BufRead as _,
        Write as _,
    },
    path::Path,
};

pub struct App {
    config: Config,
    playlist: Playlist,
}

impl App {
    pub fn new(args: Args) -> Result<Self> {
        let config = Config::new(args).context("failed to load configuration")?;
        config.validate()?;

        let playlist = Playlist::load(&config.video_list, &config.portal)?;
        info!("Loaded {} videos from {:?}", playlist.len(), config.video_list);

        Ok(Self { config, playlist })
    }

    pub async fn run(self) -> Result<()> {
        let summary = WatchSession::run(self.config, self.playlist, &StdinCaptchaPrompt).await?;
        info!("All videos processed: {summary}");
        Ok(())
    }
}

/// Reads the captcha answer from the terminal.
struct StdinCaptchaPrompt;

impl CaptchaPrompt for StdinCaptchaPrompt {
    fn ask(&self, image: Option<&Path>) -> Result<Option<String>> {
        match image {
            Some(path) => println!("Captcha image saved to {}", path.display()),
            None => println!("No captcha image found; check the browser window."),
        }
        print!("Enter the captcha text (press enter if none is shown): ");
        io::stdout().flush().context("failed to flush stdout")?;

        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("failed to read the captcha input")?;
        let line = line.trim().to_string();

        Ok((!line.is_empty()).then_some(line))
    }
}
