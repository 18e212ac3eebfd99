extern crate clap;
use clap::*;

mod cmd_smsn;

fn init_logger(verbosity: &str) {
    let level = match verbosity {
        "DEBUG" => log::LevelFilter::Debug,
        "INFO" => log::LevelFilter::Info,
        "WARNING" => log::LevelFilter::Warn,
        // log has no level above error
        _ => log::LevelFilter::Error,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let app = Command::new("smsn")
        .version(crate_version!())
        .author(crate_authors!())
        .about("`smsn` - Single Molecule, Single Nucleotide methylation of SMRT subreads")
        .propagate_version(true)
        .arg_required_else_help(true)
        .color(ColorChoice::Auto)
        .arg(
            Arg::new("verbosity")
                .long("verbosity")
                .short('v')
                .global(true)
                .num_args(1)
                .default_value("INFO")
                .value_parser(["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])
                .help("Logging level, RUST_LOG takes precedence"),
        )
        .subcommand(cmd_smsn::run::make_subcommand())
        .subcommand(cmd_smsn::holes::make_subcommand())
        .subcommand(cmd_smsn::check::make_subcommand())
        .subcommand(cmd_smsn::aln::make_subcommand())
        .subcommand(cmd_smsn::context::make_subcommand())
        .subcommand(cmd_smsn::compile::make_subcommand())
        .after_help(
            r###"Subcommand groups:

* Pipeline:
    * run     - Kinetics of every molecule, from subreads to one CSV
    * compile - Merge leftover batch files of an interrupted run

* Inspection:
    * holes   - Group subreads by ZMW hole
    * check   - Are the subreads grouped by hole?
    * aln     - Alignment statistics of CCS reads
    * context - Sequence context of a reference position

* External tools used by `run`: samtools, pbindex, blasr, ipdSummary and ccs
  (unless --ccs is given)

"###,
        );

    let matches = app.get_matches();
    init_logger(matches.get_one::<String>("verbosity").unwrap());

    // Check which subcomamnd the user ran...
    match matches.subcommand() {
        Some(("run", sub_matches)) => cmd_smsn::run::execute(sub_matches),
        Some(("holes", sub_matches)) => cmd_smsn::holes::execute(sub_matches),
        Some(("check", sub_matches)) => cmd_smsn::check::execute(sub_matches),
        Some(("aln", sub_matches)) => cmd_smsn::aln::execute(sub_matches),
        Some(("context", sub_matches)) => cmd_smsn::context::execute(sub_matches),
        Some(("compile", sub_matches)) => cmd_smsn::compile::execute(sub_matches),
        _ => unreachable!(),
    }?;

    Ok(())
}
