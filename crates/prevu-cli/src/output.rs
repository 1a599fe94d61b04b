//! Tabular rendering of discovered tunnels

use prevu_proto::FlatTunnel;

const HEADERS: [&str; 3] = ["Service", "Port", "URL"];

/// Renders the three-column tunnel table with columns padded to fit.
pub fn render_table(tunnels: &[FlatTunnel]) -> String {
    let rows: Vec<[String; 3]> = tunnels
        .iter()
        .map(|t| [t.service.clone(), t.port.to_string(), t.url.clone()])
        .collect();

    let mut widths = [HEADERS[0].len(), HEADERS[1].len(), HEADERS[2].len()];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    write_row(&mut out, HEADERS[0], HEADERS[1], HEADERS[2], &widths);
    for row in &rows {
        write_row(&mut out, &row[0], &row[1], &row[2], &widths);
    }
    out
}

fn write_row(out: &mut String, service: &str, port: &str, url: &str, widths: &[usize; 3]) {
    out.push_str(&format!(
        "{:<service_width$}  {:<port_width$}  {}\n",
        service,
        port,
        url,
        service_width = widths[0],
        port_width = widths[1],
    ));
}
