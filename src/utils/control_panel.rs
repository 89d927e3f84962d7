use crate::utils::config::Prescription;

/// What the interactive page offers the user next to the network plot.
pub struct ControlPanel<'a> {
    pub prescriptions: &'a [String],
    pub prescription: &'a Prescription,
    pub pathways: &'a [String],
    pub pathway_filter: Option<&'a str>,
    pub selected_node: Option<&'a str>,
    pub warnings: &'a [String],
}

const PANEL_STYLE: &str = r#"<style>
#herbnet-controls { font-family: sans-serif; font-size: 13px; padding: 8px 12px; border-bottom: 1px solid #ddd; }
#herbnet-controls fieldset { display: inline-block; vertical-align: top; border: 1px solid #ccc; margin: 4px; }
#herbnet-controls input.dose { width: 4em; }
#herbnet-warnings { color: #8a1c1c; margin: 4px 0; }
#herbnet-status { margin: 4px 0; min-height: 1em; }
#herbnet-status.error { color: #8a1c1c; }
</style>"#;

const CONTROL_SCRIPT: &str = r#"<script>
(function () {
  var session = new URLSearchParams(window.location.search).get('session') || 'default';
  var query = '?session=' + encodeURIComponent(session);

  function show(message, isError) {
    var status = document.getElementById('herbnet-status');
    status.textContent = message;
    status.className = isError ? 'error' : '';
  }

  function post(url, body) {
    return fetch(url + query, {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify(body || {})
    }).then(function (response) {
      return response.json().then(function (data) {
        if (!response.ok) { throw new Error(data.error || response.statusText); }
        return data;
      });
    });
  }

  function postAndReload(url, body) {
    show('Working...', false);
    post(url, body)
      .then(function () { window.location.reload(); })
      .catch(function (error) { show(error.message, true); });
  }

  function doseInputs() {
    var doses = [];
    document.querySelectorAll('#herbnet-controls input.dose').forEach(function (input) {
      if (input.value.trim() !== '') { doses.push(input.dataset.herb + '=' + input.value.trim()); }
    });
    var extra = document.getElementById('herbnet-extra-doses').value;
    extra.split(',').forEach(function (entry) {
      if (entry.trim() !== '') { doses.push(entry.trim()); }
    });
    return doses;
  }

  window.addEventListener('load', function () {
    document.querySelectorAll('a.herbnet-download').forEach(function (link) {
      link.href = link.getAttribute('href') + '&session=' + encodeURIComponent(session);
    });
    document.getElementById('herbnet-prescription').addEventListener('change', function (event) {
      postAndReload('/api/select', { prescription: event.target.value });
    });
    document.getElementById('herbnet-pathway').addEventListener('change', function (event) {
      postAndReload('/api/select', { pathway: event.target.value });
    });
    document.getElementById('herbnet-run').addEventListener('click', function () {
      postAndReload('/api/select', { doses: doseInputs() });
    });
    document.getElementById('herbnet-reset').addEventListener('click', function () {
      postAndReload('/api/reset');
    });
    document.getElementById('herbnet-gsea').addEventListener('click', function () {
      show('Running enrichment, this can take a few minutes...', false);
      post('/api/gsea').then(function (report) {
        var message = 'Enrichment written to ' + report.output_dir + ' (' + report.ranked_genes + ' ranked genes)';
        if (report.failures.length > 0) { message += '. Failed: ' + report.failures.join('; '); }
        show(message, report.failures.length > 0);
      }).catch(function (error) { show(error.message, true); });
    });

    document.querySelectorAll('.js-plotly-plot').forEach(function (plot) {
      plot.on('plotly_click', function (event) {
        var point = event.points[0];
        var info = point.hovertext || point.text;
        if (!info) { return; }
        postAndReload('/api/select', { node_info: info });
      });
    });
  });
})();
</script>"#;

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn options(values: &[String], current: &str) -> String {
    values
        .iter()
        .map(|value| {
            let selected = if value == current { " selected" } else { "" };
            format!(
                r#"<option value="{value}"{selected}>{value}</option>"#,
                value = html_escape(value),
                selected = selected,
            )
        })
        .collect()
}

fn dose_inputs(prescription: &Prescription) -> String {
    prescription
        .herbs
        .iter()
        .map(|herb| {
            format!(
                r#"<label>{herb} <input class="dose" data-herb="{herb}" value="{weight}"></label> "#,
                herb = html_escape(herb),
                weight = prescription.weights.get(herb),
            )
        })
        .collect()
}

fn warning_list(warnings: &[String]) -> String {
    if warnings.is_empty() {
        return String::new();
    }
    let items: String = warnings
        .iter()
        .map(|warning| format!("<li>{}</li>", html_escape(warning)))
        .collect();
    format!(r#"<ul id="herbnet-warnings">{}</ul>"#, items)
}

pub fn render_controls(panel: &ControlPanel) -> String {
    let pathway = panel.pathway_filter.unwrap_or_default();
    let selected_node = match panel.selected_node {
        Some(id) => format!(" Showing the neighbourhood of <b>{}</b>.", html_escape(id)),
        None => String::new(),
    };

    format!(
        r#"{style}
<div id="herbnet-controls">
<fieldset><legend>Prescription</legend>
<select id="herbnet-prescription">{prescriptions}</select>
</fieldset>
<fieldset><legend>Pathway filter</legend>
<select id="herbnet-pathway">{pathways}</select>
</fieldset>
<fieldset><legend>Doses</legend>
{doses}
<input id="herbnet-extra-doses" placeholder="HERB=WEIGHT, ...">
<button id="herbnet-run" type="button">Run analysis</button>
</fieldset>
<fieldset><legend>Selection</legend>
<button id="herbnet-reset" type="button">Reset selection</button>
<button id="herbnet-gsea" type="button">Run GSEA</button>
</fieldset>
<fieldset><legend>Download</legend>
<a class="herbnet-download" href="/api/download/nodes?format=csv">Nodes CSV</a>
<a class="herbnet-download" href="/api/download/edges?format=csv">Edges CSV</a>
</fieldset>
{warnings}
<div id="herbnet-status">{selected_node}</div>
</div>"#,
        style = PANEL_STYLE,
        prescriptions = options(panel.prescriptions, &panel.prescription.name),
        pathways = options(panel.pathways, pathway),
        doses = dose_inputs(panel.prescription),
        warnings = warning_list(panel.warnings),
        selected_node = selected_node,
    )
}

/// Puts the controls at the top of the plot's `<body>` and the control
/// script before `</body>`.
pub fn render_page(plot_html: &str, panel: &ControlPanel) -> String {
    let controls = render_controls(panel);

    let mut page = match plot_html.find("<body>") {
        Some(start) => {
            let after = start + "<body>".len();
            format!("{}{}{}", &plot_html[..after], controls, &plot_html[after..])
        }
        None => format!("{}{}", controls, plot_html),
    };

    match page.rfind("</body>") {
        Some(end) => page.insert_str(end, CONTROL_SCRIPT),
        None => page.push_str(CONTROL_SCRIPT),
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::score_aggregation::HerbWeights;

    fn prescription() -> Prescription {
        let mut weights = HerbWeights::new();
        weights.set("SMHB00336", 3.75);
        Prescription::new(
            "Saengmaek-san",
            vec!["SMHB00336".to_string(), "SMHB00041".to_string()],
            weights,
        )
    }

    #[test]
    fn page_carries_every_control() {
        let prescription = prescription();
        let prescriptions = vec!["Ojeok-san".to_string(), "Saengmaek-san".to_string()];
        let pathways = vec!["All".to_string(), "Apoptosis".to_string()];
        let warnings = vec!["Skipped herb SMHB00041: Resource not found".to_string()];
        let panel = ControlPanel {
            prescriptions: &prescriptions,
            prescription: &prescription,
            pathways: &pathways,
            pathway_filter: Some("Apoptosis"),
            selected_node: None,
            warnings: &warnings,
        };

        let page = render_page("<html><head></head><body><div id=\"plot\"></div></body></html>", &panel);

        assert!(page.contains(r#"<option value="Saengmaek-san" selected>"#));
        assert!(page.contains(r#"<option value="Apoptosis" selected>"#));
        assert!(page.contains(r#"data-herb="SMHB00336" value="3.75""#));
        assert!(page.contains(r#"data-herb="SMHB00041" value="1""#));
        assert!(page.contains(r#"id="herbnet-run""#));
        assert!(page.contains(r#"id="herbnet-reset""#));
        assert!(page.contains(r#"id="herbnet-gsea""#));
        assert!(page.contains("/api/download/nodes?format=csv"));
        assert!(page.contains("/api/download/edges?format=csv"));
        assert!(page.contains("<li>Skipped herb SMHB00041: Resource not found</li>"));

        let controls = page.find("herbnet-controls").unwrap();
        let plot = page.find(r#"<div id="plot">"#).unwrap();
        let script = page.find("plotly_click").unwrap();
        assert!(controls < plot && plot < script);
        assert!(page.ends_with("</body></html>"));
    }

    #[test]
    fn markup_in_names_is_escaped() {
        let prescription = prescription();
        let prescriptions = vec!["<b>x</b>".to_string()];
        let warnings = vec!["Pathway scores unavailable: \"a\" & 'b'".to_string()];
        let panel = ControlPanel {
            prescriptions: &prescriptions,
            prescription: &prescription,
            pathways: &[],
            pathway_filter: None,
            selected_node: Some("<G1>"),
            warnings: &warnings,
        };

        let controls = render_controls(&panel);
        assert!(controls.contains("&lt;b&gt;x&lt;/b&gt;"));
        assert!(controls.contains("&quot;a&quot; &amp; &#39;b&#39;"));
        assert!(controls.contains("<b>&lt;G1&gt;</b>"));
    }

    #[test]
    fn no_warning_list_when_clean() {
        let prescription = prescription();
        let panel = ControlPanel {
            prescriptions: &[],
            prescription: &prescription,
            pathways: &[],
            pathway_filter: None,
            selected_node: None,
            warnings: &[],
        };
        assert!(!render_controls(&panel).contains("herbnet-warnings"));
    }
}
