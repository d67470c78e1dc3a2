fn setup_environment() {
    // A stray interpreter setup breaks yt-dlp. PATH and encoding are set per
    // spawn by the supervisor.
    std::env::remove_var("PYTHONHOME");
    std::env::remove_var("PYTHONPATH");
}

fn main() -> anyhow::Result<()> {
    setup_environment();
    reelgrab_lib::run()
}
