use clap::*;
use std::path::PathBuf;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("compile")
        .about("Merges the batch files of a run")
        .after_help(
            r###"
Merges the `tmp_analysis_chunk_<n>.csv` files left in a working directory into
one CSV. This is what `smsn run` does at the end; use it when that last step
failed or the run was interrupted.

* Duplicated rows are dropped
* Rows are sorted by HoleID, tpl and strand
* The batch files are removed once the output is written

Examples:
1. smsn compile smsn_tmpdir_x1Yz -o methylation.csv

"###,
        )
        .arg(
            Arg::new("dir")
                .required(true)
                .num_args(1)
                .index(1)
                .value_parser(value_parser!(PathBuf))
                .help("Directory of the batch files"),
        )
        .arg(
            Arg::new("outfile")
                .long("outfile")
                .short('o')
                .required(true)
                .num_args(1)
                .help("Output filename. [stdout] for screen"),
        )
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    let dir = args.get_one::<PathBuf>("dir").unwrap();
    let outfile = args.get_one::<String>("outfile").unwrap();

    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }
    smsn::libs::compile::compile(dir, outfile)?;

    Ok(())
}
