use slog::Drain;

/// Terminal logger for embedders and tests. Records are formatted off the calling thread.
pub fn create_root_logger_for_stdout(node_name: String) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("NodeName" => node_name))
}
