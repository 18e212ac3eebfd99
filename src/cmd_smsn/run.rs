use clap::*;
use smsn::libs::config::{self, RunConfig};
use std::path::PathBuf;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("run")
        .about("Per-molecule, per-nucleotide kinetics of SMRT subreads")
        .after_help(
            r###"
For every ZMW hole whose CCS read aligns to the reference, the subreads are
realigned on the aligned span (padded by 100 bp) and ipdSummary is run on them.
All rows end up in one CSV, sorted by HoleID, tpl and strand.

Columns:
    HoleID,scaffold,tpl,strand,base,score,tMean,tErr,modelPrediction,
    ipdRatio,coverage,isboundary[,identificationQv][,context]

* tpl is 1-based on the reference scaffold, strand 0 is forward
* isboundary is True within 10 bp of the ends of the CCS alignment
* A hole that gives no data is kept as a row with only its HoleID

Notes:
* Needs samtools, pbindex, blasr, ipdSummary; ccs unless --ccs is given
* Models are given by name (SP2-C2, SP3-C3, P6-C4) and looked up in
  --model-dir or $SMSN_MODEL_DIR as <name>.npz.gz, or as a path to a file
* --parallel 0 uses all cores; it is capped to the available cores
* Molecules are analyzed by batches of --chunk-size, each batch is saved to
  <tmpdir>/tmp_analysis_chunk_<n>.csv before the next one starts
* If the final merge fails, the batch files are kept; see `smsn compile`

Examples:
1. Default settings:
   smsn run -b subreads.bam -r ref.fa -m P6-C4 --model-dir models -o out.csv

2. Reuse an existing CCS file, 16 cores:
   smsn run -b subreads.bam -r ref.fa -c ccs.bam -p 16 -o out.csv

"###,
        )
        .arg(
            Arg::new("bam")
                .long("bam")
                .short('b')
                .required(true)
                .num_args(1)
                .help("Subreads, .bam or .sam"),
        )
        .arg(
            Arg::new("reference")
                .long("reference")
                .short('r')
                .required(true)
                .num_args(1)
                .help("Reference genome in FASTA"),
        )
        .arg(
            Arg::new("model")
                .long("model")
                .short('m')
                .num_args(1)
                .default_value("SP2-C2")
                .help("IPD model, a name or a path"),
        )
        .arg(
            Arg::new("model_dir")
                .long("model-dir")
                .num_args(1)
                .value_parser(value_parser!(PathBuf))
                .help("Where named models are, default $SMSN_MODEL_DIR"),
        )
        .arg(
            Arg::new("outfile")
                .long("output")
                .short('o')
                .required(true)
                .num_args(1)
                .help("Output filename. [stdout] for screen"),
        )
        .arg(
            Arg::new("ccs")
                .long("ccs")
                .short('c')
                .num_args(1)
                .help("Existing CCS reads; skips running ccs"),
        )
        .arg(
            Arg::new("min_identity")
                .long("min-identity")
                .short('i')
                .num_args(1)
                .default_value("0.99")
                .value_parser(value_parser!(f64))
                .help("Minimal identity of the CCS alignment, in ]0, 1]"),
        )
        .arg(
            Arg::new("min_subreads")
                .long("min-subreads")
                .num_args(1)
                .default_value("50")
                .value_parser(value_parser!(usize))
                .help("Holes need strictly more subreads than this"),
        )
        .arg(
            Arg::new("tmpdir")
                .long("tmpdir")
                .short('t')
                .num_args(1)
                .value_parser(value_parser!(PathBuf))
                .help("Working directory, kept at the end"),
        )
        .arg(
            Arg::new("parallel")
                .long("parallel")
                .short('p')
                .num_args(1)
                .default_value("1")
                .value_parser(value_parser!(usize))
                .help("Number of threads, 0 for all cores"),
        )
        .arg(
            Arg::new("chunk_size")
                .long("chunk-size")
                .short('k')
                .num_args(1)
                .default_value("5000")
                .value_parser(value_parser!(usize))
                .help("Molecules per batch"),
        )
        .arg(
            Arg::new("no_context")
                .long("no-context")
                .action(ArgAction::SetTrue)
                .help("Drop the context column"),
        )
        .arg(
            Arg::new("no_idqv")
                .long("no-idqv")
                .action(ArgAction::SetTrue)
                .help("Drop the identificationQv column"),
        )
        .arg(
            Arg::new("preserve_tmpdir")
                .long("preserve-tmpdir")
                .action(ArgAction::SetTrue)
                .help("Keep the generated working directory"),
        )
        .arg(
            Arg::new("progress")
                .long("progress")
                .action(ArgAction::SetTrue)
                .help("Show a progress bar"),
        )
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    //----------------------------
    // Args
    //----------------------------
    let config = RunConfig {
        bam: args.get_one::<String>("bam").unwrap().to_string(),
        reference: args.get_one::<String>("reference").unwrap().to_string(),
        model: args.get_one::<String>("model").unwrap().to_string(),
        model_dir: args.get_one::<PathBuf>("model_dir").cloned(),
        output: args.get_one::<String>("outfile").unwrap().to_string(),
        ccs: args.get_one::<String>("ccs").cloned(),
        min_identity: *args.get_one::<f64>("min_identity").unwrap(),
        min_subreads: *args.get_one::<usize>("min_subreads").unwrap(),
        tmpdir: args.get_one::<PathBuf>("tmpdir").cloned(),
        parallel: *args.get_one::<usize>("parallel").unwrap(),
        chunk_size: *args.get_one::<usize>("chunk_size").unwrap(),
        context: !args.get_flag("no_context"),
        identification_qv: !args.get_flag("no_idqv"),
        preserve_tmpdir: args.get_flag("preserve_tmpdir"),
        progress: args.get_flag("progress"),
    };
    config.validate()?;
    if config.model_dir.is_none() && std::env::var_os(config::MODEL_DIR_ENV).is_none() {
        log::debug!("Neither --model-dir nor ${} is set", config::MODEL_DIR_ENV);
    }

    //----------------------------
    // Operating
    //----------------------------
    let summary = smsn::libs::pipeline::run(config)?;

    //----------------------------
    // Output
    //----------------------------
    log::info!(
        "{} rows for {} molecules ({} without data)",
        summary.compile.rows,
        summary.dispatch.dispatched,
        summary.dispatch.failed
    );

    Ok(())
}
