use super::*;
use clap::CommandFactory;

#[test]
fn verify_cli_args() {
    // Validates the entire command tree: short flag conflicts,
    // duplicate args, and other clap definition errors.
    Cli::command().debug_assert();
}

#[test]
fn compile_args_keep_model_order() {
    let cli = Cli::try_parse_from([
        "ff",
        "compile",
        "models/stg.sql",
        "models/orders.sql",
        "--source",
        "raw.payments",
        "--full-refresh",
        "-o",
        "json",
    ])
    .unwrap();
    match cli.command {
        Commands::Compile(args) => {
            assert_eq!(args.models, vec!["models/stg.sql", "models/orders.sql"]);
            assert_eq!(args.source, vec!["raw.payments"]);
            assert!(args.full_refresh);
            assert!(!args.non_destructive);
            assert_eq!(args.output, CompileOutput::Json);
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn compile_requires_models() {
    assert!(Cli::try_parse_from(["ff", "compile"]).is_err());
}
