pub mod accounting;
pub mod config;
pub mod ledger;
pub mod net;
pub mod protocol;
pub mod worker;

#[cfg(test)]
mod test_logging {
    use chrono::Local;
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::{
        Layer, Registry,
        fmt::{self, writer::BoxMakeWriter},
        layer::SubscriberExt,
        util::SubscriberInitExt,
    };

    use std::fs::File;

    // always setup tracing first
    #[ctor::ctor]
    fn setup() {
        let timestamp = Local::now().format("%d_%H-%M-%S").to_string();
        let log_dir = format!("./test_output/{}", timestamp);
        std::fs::create_dir_all(&log_dir).expect("failed to create log directory");

        let filename = format!("{log_dir}/output.log");
        let file = File::create(filename).expect("failed to create log file");

        let console_layer = fmt::layer()
            .with_ansi(true)
            .with_level(true)
            .with_filter(LevelFilter::ERROR);

        let file_layer = fmt::layer()
            .with_writer(BoxMakeWriter::new(file))
            .with_ansi(false)
            .with_level(true)
            .with_filter(LevelFilter::DEBUG);

        let _ = Registry::default()
            .with(file_layer)
            .with(console_layer)
            .try_init();
    }
}
