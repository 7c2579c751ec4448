//! User-facing text: messages, report template and the page itself

/// First line of the downloadable report
pub const REPORT_TITLE: &str = "Llama Vision Demo";
pub const REPORT_RULE: &str = "===============================";

pub const MISSING_IMAGE_MESSAGE: &str = "Please upload an image first!";
pub const MISSING_PROMPT_MESSAGE: &str = "Please enter a prompt!";

/// Single-page UI served at `/`
pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Image and Prompt Processor</title>
    <style>
        * { box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            margin: 0;
            padding: 32px;
            background: #f6f7fb;
            color: #222;
        }
        h1 { margin-top: 0; }
        .columns { display: flex; gap: 24px; flex-wrap: wrap; }
        .column {
            flex: 1 1 360px;
            background: white;
            border-radius: 12px;
            padding: 20px;
            box-shadow: 0 2px 10px rgba(0,0,0,0.06);
        }
        #preview { max-width: 100%; border-radius: 8px; margin-top: 12px; display: none; }
        textarea { width: 100%; height: 150px; padding: 8px; font: inherit; }
        button {
            margin-top: 12px;
            padding: 10px 22px;
            border: none;
            border-radius: 8px;
            background: #ff4b4b;
            color: white;
            font-weight: 600;
            cursor: pointer;
        }
        button:disabled { opacity: 0.6; cursor: wait; }
        .error {
            display: none;
            margin-top: 20px;
            padding: 12px;
            border-radius: 8px;
            background: #fee;
            color: #b00;
        }
        .results {
            display: none;
            margin-top: 24px;
            background: white;
            border-radius: 12px;
            padding: 20px;
            box-shadow: 0 2px 10px rgba(0,0,0,0.06);
        }
        .success { background: #eaf8ee; border-radius: 8px; padding: 12px; white-space: pre-wrap; }
    </style>
</head>
<body>
    <h1>✨ Image and Prompt Processing App</h1>
    <p>Upload an image and enter a prompt as your input!</p>

    <div class="columns">
        <div class="column">
            <h3>Upload Image</h3>
            <input type="file" id="fileInput" accept=".jpg,.jpeg,.png">
            <img id="preview" alt="Uploaded Image">
        </div>
        <div class="column">
            <h3>Enter Prompt</h3>
            <textarea id="prompt" placeholder="Enter your prompt or instructions..."></textarea>
            <button id="processButton">Process</button>
        </div>
    </div>

    <div class="error" id="error"></div>

    <div class="results" id="results">
        <h3>Processing Results</h3>
        <p>🖼️ Image Analysis:</p>
        <div class="success" id="response"></div>
        <p><a href="/report" id="download">Download Analysis Report</a></p>
    </div>

    <script>
        const fileInput = document.getElementById('fileInput');
        const preview = document.getElementById('preview');
        const promptInput = document.getElementById('prompt');
        const processButton = document.getElementById('processButton');
        const errorDiv = document.getElementById('error');
        const results = document.getElementById('results');
        const responseDiv = document.getElementById('response');

        function showError(message) {
            errorDiv.textContent = message;
            errorDiv.style.display = 'block';
        }

        async function readError(response) {
            try {
                const body = await response.json();
                return body.error || response.statusText;
            } catch (_) {
                return response.statusText;
            }
        }

        fileInput.addEventListener('change', async () => {
            const file = fileInput.files[0];
            if (!file) return;
            errorDiv.style.display = 'none';

            const formData = new FormData();
            formData.append('image', file);
            const response = await fetch('/upload', { method: 'POST', body: formData });
            if (!response.ok) {
                preview.style.display = 'none';
                showError(await readError(response));
                return;
            }
            preview.src = '/image?t=' + Date.now();
            preview.style.display = 'block';
        });

        processButton.addEventListener('click', async () => {
            errorDiv.style.display = 'none';
            processButton.disabled = true;
            processButton.textContent = 'Generating response with Llama Vision...';
            try {
                const response = await fetch('/process', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ prompt: promptInput.value })
                });
                if (!response.ok) {
                    showError(await readError(response));
                    return;
                }
                const result = await response.json();
                responseDiv.textContent = 'Llama Vision Response:\n' + result.response;
                results.style.display = 'block';
            } catch (e) {
                showError('Error during processing: ' + e.message);
            } finally {
                processButton.disabled = false;
                processButton.textContent = 'Process';
            }
        });
    </script>
</body>
</html>
"#;
