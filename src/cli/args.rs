use clap::{value_parser, Arg, ArgAction, Command};

fn slave_arg() -> Arg {
    Arg::new("slave")
        .help("Modbus slave address (1-247)")
        .required(true)
        .value_parser(value_parser!(u8).range(1..=247))
}

pub fn build_cli() -> Command {
    Command::new("rs485-lights")
        .version(crate::VERSION)
        .about("Switches RS485 light actuators over Modbus RTU (write single coil)")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .default_value("config/lights.toml")
                .help("Settings file (TOML)"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .global(true)
                .help("Serial port, overrides the settings file"),
        )
        .arg(
            Arg::new("baud")
                .short('b')
                .long("baud")
                .global(true)
                .value_parser(value_parser!(u32))
                .help("Baud rate (9600 or 115200), overrides the settings file"),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .global(true)
                .help("Also append Modbus trace events to this file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Debug logging, including raw frames"),
        )
        .subcommand_required(true)
        .subcommand(Command::new("ports").about("List available serial ports"))
        .subcommand(Command::new("on").about("Switch one light on").arg(slave_arg()))
        .subcommand(Command::new("off").about("Switch one light off").arg(slave_arg()))
        .subcommand(Command::new("all-on").about("Switch every bound light on"))
        .subcommand(Command::new("all-off").about("Switch every bound light off"))
        .subcommand(
            Command::new("light")
                .about("Switch the light bound to a detection label")
                .arg(Arg::new("label").required(true).help("e.g. songoku, dog"))
                .arg(
                    Arg::new("state")
                        .required(true)
                        .value_parser(["on", "off"]),
                ),
        )
        .subcommand(
            Command::new("blink")
                .about("Run the blink test on every bound light")
                .arg(
                    Arg::new("cycles")
                        .long("cycles")
                        .value_parser(value_parser!(u32)),
                )
                .arg(
                    Arg::new("on-ms")
                        .long("on-ms")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("off-ms")
                        .long("off-ms")
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(Command::new("follow").about(
            "Switch lights from zone events on stdin, one '<label> inside|outside' per line",
        ))
        .subcommand(
            Command::new("init-config")
                .about("Write the default settings file")
                .arg(Arg::new("path").required(true)),
        )
}
