use ecprims_port::ByteChannel;
use ecprims_proto::layout::{
    HOST_CMD, HOST_CMD_FLAG_LPC_ARGS_SUPPORTED, HOST_CMD_FLAG_VERSION_3, HOST_DATA,
    MEMMAP_HOST_CMD_FLAGS,
};
use ecprims_proto::{MemoryMap, Protocol};
use tracing::{debug, info};

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::lock::{ExchangeLock, LockGuard};
use crate::transport::Transport;

/// What probing the EC found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// Host command protocol to use.
    pub protocol: Protocol,
    /// Base at which the `"EC"` signature was found.
    pub memmap_base: u16,
    /// Host command capability flags read from the memory map.
    pub flags: u8,
}

/// Pick a protocol from the capability flags. v3 wins when both are set.
pub fn select_protocol(flags: u8) -> Result<Protocol> {
    if flags & HOST_CMD_FLAG_VERSION_3 != 0 {
        Ok(Protocol::V3)
    } else if flags & HOST_CMD_FLAG_LPC_ARGS_SUPPORTED != 0 {
        Ok(Protocol::V2)
    } else {
        Err(TransportError::UnsupportedProtocol { flags })
    }
}

/// Probe the channel for an EC without taking any lock.
///
/// Fails with [`TransportError::EcNotPresent`] when both status ports read
/// 0xFF (nothing on the bus) or no candidate base carries the signature. A
/// candidate whose region would run past port 0xFFFF is rejected before any
/// port is read.
pub fn probe<C: ByteChannel + ?Sized>(channel: &mut C, bases: &[u16]) -> Result<Negotiated> {
    let maps = bases
        .iter()
        .map(|&base| MemoryMap::try_new(base))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let cmd = channel.read_byte(HOST_CMD)?;
    let data = channel.read_byte(HOST_DATA)?;
    if cmd == 0xFF && data == 0xFF {
        debug!(channel = channel.name(), "status ports saturated");
        return Err(TransportError::EcNotPresent("ports read 0xFF".to_string()));
    }

    let mut found = None;
    for map in maps {
        if map.has_signature(channel)? {
            found = Some(map);
            break;
        }
        debug!(base = format_args!("{:#x}", map.base()), "no EC signature");
    }
    let Some(map) = found else {
        return Err(TransportError::EcNotPresent(
            "missing memory map".to_string(),
        ));
    };

    let flags = map.read_u8(channel, MEMMAP_HOST_CMD_FLAGS)?;
    let protocol = select_protocol(flags)?;
    Ok(Negotiated {
        protocol,
        memmap_base: map.base(),
        flags,
    })
}

/// Probe the EC under the exchange lock and build a [`Transport`].
pub fn negotiate<C, L>(mut channel: C, mut lock: L, config: TransportConfig) -> Result<Transport<C, L>>
where
    C: ByteChannel,
    L: ExchangeLock,
{
    let negotiated = {
        let _guard = LockGuard::acquire(&mut lock, config.lock_timeout)?;
        probe(&mut channel, &config.memmap_bases)?
    };
    info!(
        channel = channel.name(),
        protocol = %negotiated.protocol,
        base = format_args!("{:#x}", negotiated.memmap_base),
        flags = format_args!("{:#04x}", negotiated.flags),
        "negotiated EC transport"
    );
    Ok(Transport::from_parts(channel, lock, negotiated, &config))
}

#[cfg(test)]
mod tests {
    use ecprims_proto::layout::{MEMMAP_BASE, MEMMAP_FALLBACK_BASE};
    use ecprims_proto::sim::SimulatedEc;
    use ecprims_proto::ProtocolError;

    use super::*;
    use crate::lock::NoLock;

    const BASES: [u16; 2] = [MEMMAP_BASE, MEMMAP_FALLBACK_BASE];

    #[test]
    fn version3_flag_wins() {
        assert_eq!(select_protocol(0x02).unwrap(), Protocol::V3);
        assert_eq!(select_protocol(0x03).unwrap(), Protocol::V3);
        assert_eq!(select_protocol(0x01).unwrap(), Protocol::V2);
        assert!(matches!(
            select_protocol(0x00),
            Err(TransportError::UnsupportedProtocol { flags: 0 })
        ));
        assert!(matches!(
            select_protocol(0x80),
            Err(TransportError::UnsupportedProtocol { flags: 0x80 })
        ));
    }

    #[test]
    fn probe_reports_flags_and_base() {
        let mut ec = SimulatedEc::new(HOST_CMD_FLAG_LPC_ARGS_SUPPORTED | HOST_CMD_FLAG_VERSION_3);
        let found = probe(&mut ec, &BASES).unwrap();
        assert_eq!(found.protocol, Protocol::V3);
        assert_eq!(found.memmap_base, MEMMAP_BASE);
        assert_eq!(found.flags, 0x03);
    }

    #[test]
    fn saturated_ports_checked_before_memory_map() {
        let mut ec = SimulatedEc::absent();
        let err = probe(&mut ec, &BASES).unwrap_err();
        assert!(matches!(err, TransportError::EcNotPresent(ref why) if why.contains("0xFF")));
        assert_eq!(ec.reads(), 2);
    }

    #[test]
    fn empty_base_list_finds_nothing() {
        let mut ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3);
        let err = probe(&mut ec, &[]).unwrap_err();
        assert!(matches!(err, TransportError::EcNotPresent(ref why) if why.contains("memory map")));
    }

    #[test]
    fn base_past_port_space_is_rejected_before_io() {
        let mut ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3);
        let err = probe(&mut ec, &[0xFFF0, MEMMAP_BASE]).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolError::MemmapBase { base: 0xFFF0 })
        ));
        assert_eq!(ec.reads(), 0);
    }

    #[test]
    fn highest_fitting_base_is_probed() {
        let mut ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3).with_memmap_base(0xFF01);
        let found = probe(&mut ec, &[MEMMAP_BASE, 0xFF01]).unwrap();
        assert_eq!(found.memmap_base, 0xFF01);
    }

    #[test]
    fn negotiation_releases_lock() {
        let ec = SimulatedEc::new(HOST_CMD_FLAG_VERSION_3);
        let transport = negotiate(ec, NoLock::new(), TransportConfig::default()).unwrap();
        let (_, lock) = transport.into_parts();
        assert!(!lock.is_held());
    }

    #[test]
    fn failed_negotiation_releases_lock() {
        let ec = SimulatedEc::new(0);
        let mut lock = NoLock::new();
        let err = negotiate(ec, &mut lock, TransportConfig::default()).unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedProtocol { flags: 0 }));
        assert!(!lock.is_held());
    }
}
