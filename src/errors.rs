use color_eyre::Result;

pub fn init_errors() -> Result<()> {
    color_eyre::install()?;

    if cfg!(debug_assertions) {
        better_panic::Settings::auto()
            .most_recent_first(false)
            .install();
    } else {
        human_panic::setup_panic!();
    }

    Ok(())
}
