fn main() -> std::process::ExitCode {
    fias_import_lib::run()
}
