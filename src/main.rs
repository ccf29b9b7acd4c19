fn main() {
    if let Err(err) = metric_diagram_panel::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
