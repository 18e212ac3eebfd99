use clap::*;
use smsn::libs::holes::{HoleGroups, Restriction};
use smsn::libs::sam::{self, SamLines};
use std::io::Write;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("holes")
        .about("Groups subreads by ZMW hole")
        .after_help(
            r###"
Splits a stream of subreads into molecules, one per ZMW hole, the way `smsn run`
does before dispatching them.

Output is `hole_id<TAB>subreads` per molecule, or the SAM records with --sam.

Notes:
* Subreads of a hole must be contiguous, e.g. after `samtools sort -n`
    * A hole that shows up again after another one is an error
* .bam files are read through `samtools view`
* Reads from stdin if input file is 'stdin'
* The hole id is the second `/`-separated token of the read name

Examples:
1. Molecules with more than 50 subreads:
   smsn holes sorted.bam --min-subreads 50

2. Records of some holes, with the header:
   smsn holes sorted.sam --restrict ids.txt --sam --header

"###,
        )
        .arg(
            Arg::new("infile")
                .required(true)
                .num_args(1)
                .index(1)
                .help("Subreads, .sam, .sam.gz or .bam"),
        )
        .arg(
            Arg::new("restrict")
                .long("restrict")
                .num_args(1)
                .help("File of hole ids to keep, one per line"),
        )
        .arg(
            Arg::new("min_subreads")
                .long("min-subreads")
                .num_args(1)
                .default_value("0")
                .value_parser(value_parser!(usize))
                .help("Holes need strictly more subreads than this"),
        )
        .arg(
            Arg::new("sam")
                .long("sam")
                .action(ArgAction::SetTrue)
                .help("Output the SAM records of each hole"),
        )
        .arg(
            Arg::new("header")
                .long("header")
                .action(ArgAction::SetTrue)
                .requires("sam")
                .help("Print the SAM header first"),
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
    //----------------------------
    // Args
    //----------------------------
    let infile = args.get_one::<String>("infile").unwrap();
    let min_subreads = *args.get_one::<usize>("min_subreads").unwrap();
    let is_sam = args.get_flag("sam");
    let is_header = args.get_flag("header");

    let restriction = match args.get_one::<String>("restrict") {
        Some(file) => {
            let ids = smsn::read_ids(file)?;
            if ids.is_empty() {
                anyhow::bail!("no hole id in {}", file);
            }
            Restriction::new(ids)
        }
        None => Restriction::Unrestricted,
    };

    let mut writer = smsn::writer(args.get_one::<String>("outfile").unwrap())?;

    //----------------------------
    // Operating
    //----------------------------
    let mut lines = SamLines::open(infile)?;
    if is_header {
        // stdin can't be read twice, text input gives its header from the same stream
        let header = if sam::is_bam(infile) {
            sam::read_header(infile)?
        } else {
            lines.header()?
        };
        if !header.is_empty() {
            writer.write_fmt(format_args!("{}\n", header))?;
        }
    }

    let groups = HoleGroups::new(lines)
        .restrict(restriction)
        .min_subreads(min_subreads);

    let mut count = 0;
    for group in groups {
        let group = group?;
        if is_sam {
            writer.write_fmt(format_args!("{}\n", group.sam_text()))?;
        } else {
            writer.write_fmt(format_args!("{}\t{}\n", group.hole_id, group.len()))?;
        }
        count += 1;
    }

    //----------------------------
    // Output
    //----------------------------
    writer.flush()?;
    log::info!("{} molecules in {}", count, infile);

    Ok(())
}
