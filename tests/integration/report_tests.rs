//! Report server serving live meter state over TCP.

use std::io::Read;
use std::net::{Ipv4Addr, TcpStream};
use std::thread;
use std::time::Duration;

use wattmeter::adapters::report_server::ReportServer;
use wattmeter::report::{PowerReport, REPORT_LEN};

use crate::harness::Rig;

fn request(server: &mut ReportServer, rig: &Rig) -> PowerReport {
    let port = server.local_addr().unwrap().port();
    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; REPORT_LEN];
        stream.read_exact(&mut buf).unwrap();
        // Server closes after one record.
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
        buf
    });

    let mut served = false;
    for _ in 0..500 {
        if server.poll(&rig.attrs, rig.config.rate_scale) {
            served = true;
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert!(served, "client never accepted");
    PowerReport::from_bytes(client.join().unwrap())
}

#[test]
fn report_tracks_pulses() {
    let rig = Rig::with_defaults();
    let mut server = ReportServer::bind(0).unwrap();

    assert_eq!(
        request(&mut server, &rig),
        PowerReport { rate: 0, cumulative: 0 }
    );

    for t in [0, 1_000, 3_000] {
        rig.pulse_at(t);
    }
    assert_eq!(
        request(&mut server, &rig),
        PowerReport { rate: 1_800, cumulative: 3 }
    );

    rig.pulse_at(3_250);
    assert_eq!(
        request(&mut server, &rig),
        PowerReport { rate: 14_400, cumulative: 4 }
    );
    assert_eq!(server.stats(), (3, 0));
}
