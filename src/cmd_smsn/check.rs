use clap::*;
use smsn::libs::holes::first_unsorted;
use smsn::libs::sam::SamLines;
use std::io::Write;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("check")
        .about("Checks that subreads are grouped by hole")
        .after_help(
            r###"
Prints one line per input file:

    <infile><TAB>grouped
    <infile><TAB>unsorted<TAB><hole_id><TAB><record>

where <record> is the 1-based number of the first record of a hole seen again
after another hole. `samtools sort -n` groups the subreads.

Examples:
1. smsn check subreads.bam

2. smsn check a.sam b.sam.gz

"###,
        )
        .arg(
            Arg::new("infiles")
                .required(true)
                .num_args(1..)
                .index(1)
                .help("Subreads, .sam, .sam.gz or .bam"),
        )
        .arg(
            Arg::new("outfile")
                .long("outfile")
                .short('o')
                .num_args(1)
                .default_value("stdout")
                .help("Output filename. [stdout] for screen"),
        )
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    let mut writer = smsn::writer(args.get_one::<String>("outfile").unwrap())?;

    for infile in args.get_many::<String>("infiles").unwrap() {
        match first_unsorted(SamLines::open(infile)?)? {
            None => writer.write_fmt(format_args!("{}\tgrouped\n", infile))?,
            Some((hole_id, record)) => {
                log::warn!("{}: hole {} reappears at record {}", infile, hole_id, record);
                writer.write_fmt(format_args!(
                    "{}\tunsorted\t{}\t{}\n",
                    infile, hole_id, record
                ))?
            }
        }
    }
    writer.flush()?;

    Ok(())
}
