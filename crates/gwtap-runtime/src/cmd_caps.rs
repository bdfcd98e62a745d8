//! `gwtap caps`: list, validate and toggle capability bitmasks.

use gwtap_core::CapabilityNegotiator;
use gwtap_core::capability::{CAPABILITY_BITS, CapabilityFlag, describe_bit};

use crate::cli::CapsCommand;

pub fn cmd_caps(cmd: CapsCommand) -> anyhow::Result<()> {
    match cmd {
        CapsCommand::List { mask } => {
            let mask = mask
                .as_deref()
                .map(CapabilityNegotiator::validate_str)
                .transpose()?;
            for line in list_lines(mask)? {
                println!("{line}");
            }
        }
        CapsCommand::Validate { text } => {
            let mask = CapabilityNegotiator::validate_str(&text)?;
            println!("{mask}");
            println!("{}", flag_summary(mask));
        }
        CapsCommand::Toggle { mask, bits } => {
            let negotiator =
                CapabilityNegotiator::with_mask(CapabilityNegotiator::validate_str(&mask)?);
            let mut result = 0;
            for bit in bits {
                result = negotiator.toggle_bit(bit)?;
            }
            println!("{result}");
        }
    }
    Ok(())
}

/// One line per bit: position, set marker, name, description.
fn list_lines(mask: Option<u32>) -> anyhow::Result<Vec<String>> {
    let mut lines = Vec::with_capacity(usize::from(CAPABILITY_BITS));
    for position in 0..CAPABILITY_BITS {
        let bit = describe_bit(position)?;
        let marker = match mask {
            Some(mask) if mask & (1 << position) != 0 => "[x]",
            Some(_) => "[ ]",
            None => "   ",
        };
        lines.push(format!(
            "{:>2} {marker} {:<38} {}",
            bit.position, bit.name, bit.description
        ));
    }
    Ok(lines)
}

fn flag_summary(mask: u32) -> String {
    let flags = CapabilityFlag::flags(mask);
    let known = CapabilityFlag::mask(&flags);
    let mut names: Vec<String> = flags.iter().map(ToString::to_string).collect();
    let reserved = mask & !known;
    if reserved != 0 {
        names.push(format!("reserved({reserved:#x})"));
    }
    if names.is_empty() {
        "(none)".to_owned()
    } else {
        names.join(" | ")
    }
}
