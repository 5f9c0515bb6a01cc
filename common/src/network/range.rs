use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Both ends must be valid TCP ports and `start <= end`.
    pub fn new(start: u16, end: u16) -> Result<Self, String> {
        if start == 0 {
            return Err("port 0 is not scannable".to_string());
        }
        if start > end {
            return Err(format!("range start {start} is above end {end}"));
        }
        Ok(Self { start, end })
    }

    pub fn to_iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_is_inclusive() {
        let range = PortRange::new(20, 25).unwrap();
        assert_eq!(range.len(), 6);
        assert_eq!(range.to_iter().collect::<Vec<_>>(), vec![20, 21, 22, 23, 24, 25]);
        assert_eq!(PortRange::new(1, 65535).unwrap().len(), 65535);
    }

    #[test]
    fn rejects_reversed_and_zero() {
        assert!(PortRange::new(100, 10).is_err());
        assert!(PortRange::new(0, 10).is_err());
    }
}
