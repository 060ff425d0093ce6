fn main() {
    let code = match rscrot::run(std::env::args().skip(1)) {
        Ok(_) => 0,
        Err(err) => {
            tracing::error!(error = ?err, "capture session failed");
            eprintln!("rscrot: {err}");
            if matches!(err, rscrot::AppError::Usage(_)) {
                eprintln!("Try 'rscrot --help' for more information.");
            }
            err.exit_code()
        }
    };
    std::process::exit(code);
}
