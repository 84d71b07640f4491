//! K+CAN composite adapter: one physical dongle exposing both a K-line
//! personality and a CAN personality, switched by `set_can`. Delegates to
//! whichever inner adapter is currently selected rather than reimplementing
//! either protocol.

use crate::error::CoreResult;
use crate::serial::adapter::Adapter;

pub struct KPlusCan<K: Adapter, C: Adapter> {
    kl: K,
    can: C,
    can_selected: bool,
}

impl<K: Adapter, C: Adapter> KPlusCan<K, C> {
    pub fn new(kl: K, can: C) -> Self {
        KPlusCan {
            kl,
            can,
            can_selected: false,
        }
    }

    fn active(&mut self) -> &mut dyn Adapter {
        if self.can_selected {
            &mut self.can
        } else {
            &mut self.kl
        }
    }
}

impl<K: Adapter, C: Adapter> Adapter for KPlusCan<K, C> {
    fn set_baud_divisor(&mut self, divisor: u16) -> CoreResult<()> {
        self.active().set_baud_divisor(divisor)
    }

    fn check_input(&mut self) -> CoreResult<Option<u8>> {
        self.active().check_input()
    }

    fn send_byte(&mut self, byte: u8) -> CoreResult<()> {
        self.active().send_byte(byte)
    }

    fn slow_init_imminent(&mut self) -> CoreResult<()> {
        self.active().slow_init_imminent()
    }

    fn send_slow_init(&mut self, address: u8) -> CoreResult<()> {
        self.active().send_slow_init(address)
    }

    fn set_l(&mut self, level: bool) -> CoreResult<()> {
        self.active().set_l(level)
    }

    fn set_can(&mut self, enabled: bool) -> CoreResult<()> {
        self.can_selected = enabled;
        self.kl.set_can(enabled)?;
        self.can.set_can(enabled)
    }

    fn get_rx_state(&mut self) -> CoreResult<bool> {
        self.active().get_rx_state()
    }

    fn set_rx_bitbang(&mut self, enabled: bool) -> CoreResult<()> {
        self.active().set_rx_bitbang(enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::adapters::fake::FakeAdapter;

    #[test]
    fn set_can_switches_active_personality() {
        let mut kl = FakeAdapter::new();
        kl.script(&[0x11]);
        let mut can = FakeAdapter::new();
        can.script(&[0x22]);
        let mut composite = KPlusCan::new(kl, can);
        assert_eq!(composite.check_input().unwrap(), Some(0x11));
        composite.set_can(true).unwrap();
        assert_eq!(composite.check_input().unwrap(), Some(0x22));
    }
}
